//! Local system identification sent with each build request

use std::path::Path;

use crate::domain::request::{BuildRequest, Distro};

const OS_RELEASE: &str = "/etc/os-release";

/// Identification of the machine the build is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub kernel_release: String,
    pub arch: String,
    pub distro: Option<Distro>,
}

impl SystemInfo {
    /// Detect the running kernel, architecture and distribution
    ///
    /// Falls back to `std::env::consts::ARCH` and an empty kernel release when
    /// `uname` is unavailable.
    pub fn detect() -> Self {
        let (kernel_release, arch) = match nix::sys::utsname::uname() {
            Ok(uts) => (
                uts.release().to_string_lossy().into_owned(),
                uts.machine().to_string_lossy().into_owned(),
            ),
            Err(_) => (String::new(), std::env::consts::ARCH.to_string()),
        };

        let distro = std::fs::read_to_string(Path::new(OS_RELEASE))
            .ok()
            .and_then(|contents| parse_os_release(&contents));

        Self {
            kernel_release,
            arch,
            distro,
        }
    }

    /// Start a request identified by this system
    pub fn request(&self) -> BuildRequest {
        let request = BuildRequest::new(self.kernel_release.clone(), self.arch.clone());
        match &self.distro {
            Some(distro) => request.with_distro(distro.name.clone(), distro.version.clone()),
            None => request,
        }
    }
}

/// Extract `ID` and `VERSION_ID` from os-release contents
pub fn parse_os_release(contents: &str) -> Option<Distro> {
    let mut name = None;
    let mut version = None;

    for line in contents.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'').to_string();
        match key {
            "ID" => name = Some(value),
            "VERSION_ID" => version = Some(value),
            _ => {}
        }
    }

    name.filter(|n| !n.is_empty())
        .map(|name| Distro { name, version })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_os_release() {
        let contents = r#"NAME="Fedora Linux"
VERSION="39 (Workstation Edition)"
ID=fedora
VERSION_ID=39
# comment
"#;
        let distro = parse_os_release(contents).unwrap();
        assert_eq!(distro.name, "fedora");
        assert_eq!(distro.version.as_deref(), Some("39"));
    }

    #[test]
    fn test_parse_os_release_without_id() {
        assert_eq!(parse_os_release("NAME=Something\n"), None);
    }

    #[test]
    fn test_request_carries_identification() {
        let info = SystemInfo {
            kernel_release: "6.1.0".to_string(),
            arch: "x86_64".to_string(),
            distro: Some(Distro {
                name: "debian".to_string(),
                version: Some("12".to_string()),
            }),
        };
        let request = info.request();
        assert_eq!(request.kernel_release, "6.1.0");
        assert_eq!(request.arch, "x86_64");
        assert_eq!(request.distro, info.distro);
        assert!(request.cmd_args.is_empty());
    }
}

//! Build request domain types
//!
//! A [`BuildRequest`] is assembled fresh for every submission and turned into a
//! [`Payload`] that the transport encodes. The request never touches the network
//! itself.

/// Form field names understood by the build service
pub mod fields {
    pub const VERSION: &str = "version";
    pub const KERNEL_RELEASE: &str = "kver";
    pub const ARCH: &str = "arch";
    pub const DISTRO_NAME: &str = "distro_name";
    pub const DISTRO_VERSION: &str = "distro_version";
    pub const CMD_ARGS: &str = "cmd_args";
    pub const ENV_VARS: &str = "env_vars";
    pub const MOK_FINGERPRINTS: &str = "mok_fingerprints";
    /// Multipart part name carrying the attached input file
    pub const FILES: &str = "files";
}

/// OS distribution identification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distro {
    pub name: String,
    pub version: Option<String>,
}

/// A single input file uploaded alongside the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A compilation/instrumentation request for the remote build service
///
/// `cmd_args` is an ordered sequence, not a set: positional flags depend on
/// order and repeated values are kept as distinct entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub protocol_version: Option<String>,
    pub kernel_release: String,
    pub arch: String,
    pub distro: Option<Distro>,
    pub cmd_args: Vec<String>,
    pub env_vars: Vec<(String, String)>,
    pub mok_fingerprints: Vec<String>,
    pub attachment: Option<Attachment>,
}

/// Ordered `(field, value)` pairs; duplicate field names are significant
pub type FormFields = Vec<(&'static str, String)>;

/// Outbound submission body, ready for the transport to encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Plain field-encoded body
    Form(FormFields),
    /// Multi-part body carrying the fields and one file part
    Multipart {
        fields: FormFields,
        file: Attachment,
    },
}

impl Payload {
    pub fn fields(&self) -> &FormFields {
        match self {
            Payload::Form(fields) => fields,
            Payload::Multipart { fields, .. } => fields,
        }
    }
}

impl BuildRequest {
    /// Create a request for the given kernel release and architecture
    pub fn new(kernel_release: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            protocol_version: None,
            kernel_release: kernel_release.into(),
            arch: arch.into(),
            distro: None,
            cmd_args: Vec::new(),
            env_vars: Vec::new(),
            mok_fingerprints: Vec::new(),
            attachment: None,
        }
    }

    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = Some(version.into());
        self
    }

    pub fn with_distro(mut self, name: impl Into<String>, version: Option<String>) -> Self {
        self.distro = Some(Distro {
            name: name.into(),
            version,
        });
        self
    }

    /// Append one command-line argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.cmd_args.push(arg.into());
        self
    }

    /// Append command-line arguments in order
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a localization variable to forward to the service
    pub fn env_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((name.into(), value.into()));
        self
    }

    pub fn mok_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.mok_fingerprints.push(fingerprint.into());
        self
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Scalar fields in wire order
    pub fn form_fields(&self) -> FormFields {
        let mut out = FormFields::new();

        if let Some(version) = &self.protocol_version {
            out.push((fields::VERSION, version.clone()));
        }
        out.push((fields::KERNEL_RELEASE, self.kernel_release.clone()));
        out.push((fields::ARCH, self.arch.clone()));

        if let Some(distro) = &self.distro {
            out.push((fields::DISTRO_NAME, distro.name.clone()));
            if let Some(version) = &distro.version {
                out.push((fields::DISTRO_VERSION, version.clone()));
            }
        }

        out.extend(
            self.cmd_args
                .iter()
                .map(|arg| (fields::CMD_ARGS, arg.clone())),
        );
        out.extend(
            self.env_vars
                .iter()
                .map(|(name, value)| (fields::ENV_VARS, format!("{}={}", name, value))),
        );
        out.extend(
            self.mok_fingerprints
                .iter()
                .map(|fp| (fields::MOK_FINGERPRINTS, fp.clone())),
        );

        out
    }

    /// Build the outbound payload
    ///
    /// Multi-part when a file is attached, plain form otherwise.
    pub fn payload(&self) -> Payload {
        let fields = self.form_fields();
        match &self.attachment {
            Some(file) => Payload::Multipart {
                fields,
                file: file.clone(),
            },
            None => Payload::Form(fields),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd_args(payload: &Payload) -> Vec<&str> {
        payload
            .fields()
            .iter()
            .filter(|(name, _)| *name == fields::CMD_ARGS)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    #[test]
    fn test_args_keep_order_and_multiplicity() {
        let probe = ["-vp4", "-e", "probe begin{exit()}"];
        let request = BuildRequest::new("6.1.0", "x86_64")
            .args(probe)
            .args(probe);

        let payload = request.payload();
        assert_eq!(
            cmd_args(&payload),
            vec![
                "-vp4",
                "-e",
                "probe begin{exit()}",
                "-vp4",
                "-e",
                "probe begin{exit()}"
            ]
        );
    }

    #[test]
    fn test_identification_fields_lead() {
        let request = BuildRequest::new("6.1.0", "aarch64")
            .with_protocol_version("1.0")
            .with_distro("fedora", Some("39".to_string()))
            .arg("-L");

        let encoded = request.form_fields();
        let names: Vec<&str> = encoded.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec!["version", "kver", "arch", "distro_name", "distro_version", "cmd_args"]
        );
        assert_eq!(encoded[1].1, "6.1.0");
        assert_eq!(encoded[2].1, "aarch64");
    }

    #[test]
    fn test_distro_without_version() {
        let request = BuildRequest::new("6.1.0", "x86_64").with_distro("debian", None);
        let encoded = request.form_fields();
        assert!(encoded.contains(&(fields::DISTRO_NAME, "debian".to_string())));
        assert!(!encoded.iter().any(|(name, _)| *name == fields::DISTRO_VERSION));
    }

    #[test]
    fn test_env_vars_and_fingerprints_encoded() {
        let request = BuildRequest::new("6.1.0", "x86_64")
            .env_var("LANG", "C")
            .env_var("LC_ALL", "en_US.UTF-8")
            .mok_fingerprint("ab:cd");

        let encoded = request.form_fields();
        assert_eq!(
            &encoded[2..],
            &[
                (fields::ENV_VARS, "LANG=C".to_string()),
                (fields::ENV_VARS, "LC_ALL=en_US.UTF-8".to_string()),
                (fields::MOK_FINGERPRINTS, "ab:cd".to_string()),
            ]
        );
    }

    #[test]
    fn test_payload_kind_follows_attachment() {
        let plain = BuildRequest::new("6.1.0", "x86_64").arg("-v");
        assert!(matches!(plain.payload(), Payload::Form(_)));

        let upload = plain
            .clone()
            .arg("script.stp")
            .attach(Attachment::new("script.stp", b"probe begin { exit() }".to_vec()));
        match upload.payload() {
            Payload::Multipart { fields: encoded, file } => {
                assert_eq!(file.name, "script.stp");
                assert_eq!(file.content, b"probe begin { exit() }");
                assert_eq!(
                    encoded.iter().filter(|(n, _)| *n == fields::CMD_ARGS).count(),
                    2
                );
            }
            other => panic!("expected multipart payload, got {:?}", other),
        }
    }
}

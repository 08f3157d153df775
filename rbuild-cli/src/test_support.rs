//! Scripted build service shared by the scheduler, fetcher and session tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use rbuild_client::{BuildService, ClientError, RawResponse, Result};
use rbuild_core::domain::request::BuildRequest;

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(RawResponse),
    /// Connection refused at the transport layer
    Refuse,
}

/// A [`BuildService`] that replays canned responses and records every call
#[derive(Default)]
pub struct ScriptedService {
    submissions: Mutex<VecDeque<Reply>>,
    polls: Mutex<VecDeque<Reply>>,
    pages: Mutex<HashMap<String, RawResponse>>,
    artifacts: Mutex<HashMap<String, std::result::Result<Vec<u8>, u16>>>,
    pub submitted: Mutex<Vec<BuildRequest>>,
    pub polled: Mutex<Vec<String>>,
    pub downloaded: Mutex<Vec<String>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_submit(self, reply: Reply) -> Self {
        self.submissions.lock().unwrap().push_back(reply);
        self
    }

    pub fn on_poll(self, reply: Reply) -> Self {
        self.polls.lock().unwrap().push_back(reply);
        self
    }

    pub fn on_get(self, location: &str, response: RawResponse) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(location.to_string(), response);
        self
    }

    pub fn with_artifact(self, location: &str, bytes: &[u8]) -> Self {
        self.artifacts
            .lock()
            .unwrap()
            .insert(location.to_string(), Ok(bytes.to_vec()));
        self
    }

    pub fn with_missing_artifact(self, location: &str, status: u16) -> Self {
        self.artifacts
            .lock()
            .unwrap()
            .insert(location.to_string(), Err(status));
        self
    }

    pub fn poll_count(&self) -> usize {
        self.polled.lock().unwrap().len()
    }
}

/// 202 with the given follow-up location and delay
pub fn accepted(location: &str, retry_after: u64) -> Reply {
    Reply::Respond(
        RawResponse::new(202, "")
            .with_header("Location", location)
            .with_header("Retry-After", retry_after.to_string()),
    )
}

pub fn pending() -> Reply {
    Reply::Respond(RawResponse::new(200, r#"{"uuid": "42"}"#))
}

pub fn see_other(location: &str) -> Reply {
    Reply::Respond(RawResponse::new(303, "").with_header("Location", location))
}

pub fn status(code: u16) -> Reply {
    Reply::Respond(RawResponse::new(code, ""))
}

/// A genuine connection-refused error from the HTTP stack
async fn refused() -> ClientError {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    match reqwest::get(format!("http://{}/", addr)).await {
        Ok(_) => panic!("expected connection to {} to be refused", addr),
        Err(e) => ClientError::RequestFailed(e),
    }
}

async fn replay(queue: &Mutex<VecDeque<Reply>>, what: &str) -> Result<RawResponse> {
    let reply = queue.lock().unwrap().pop_front();
    match reply {
        Some(Reply::Respond(response)) => Ok(response),
        Some(Reply::Refuse) => Err(refused().await),
        None => panic!("unexpected {} request", what),
    }
}

#[async_trait]
impl BuildService for ScriptedService {
    fn base_url(&self) -> &str {
        "http://build.test"
    }

    async fn ping(&self) -> Result<RawResponse> {
        Ok(RawResponse::new(200, ""))
    }

    async fn submit(&self, request: &BuildRequest) -> Result<RawResponse> {
        self.submitted.lock().unwrap().push(request.clone());
        replay(&self.submissions, "submit").await
    }

    async fn poll(&self, location: &str) -> Result<RawResponse> {
        self.polled.lock().unwrap().push(location.to_string());
        replay(&self.polls, "poll").await
    }

    async fn get(&self, location: &str) -> Result<RawResponse> {
        let page = self.pages.lock().unwrap().get(location).cloned();
        Ok(page.unwrap_or_else(|| RawResponse::new(404, "")))
    }

    async fn download(&self, location: &str) -> Result<Vec<u8>> {
        self.downloaded.lock().unwrap().push(location.to_string());
        let artifact = self.artifacts.lock().unwrap().get(location).cloned();
        match artifact {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(status)) => Err(ClientError::Artifact {
                location: location.to_string(),
                status,
            }),
            None => Err(ClientError::Artifact {
                location: location.to_string(),
                status: 404,
            }),
        }
    }
}

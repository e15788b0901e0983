use std::fmt;
use std::str::FromStr;
use std::time;

use async_trait::async_trait;
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Supported HTTP methods for forwarding the live count.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum ForwardMethod {
    #[default]
    GET,
    POST,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseForwardMethodError(pub String);

impl FromStr for ForwardMethod {
    type Err = ParseForwardMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_ref() {
            "GET" => Ok(ForwardMethod::GET),
            "POST" => Ok(ForwardMethod::POST),
            invalid => Err(ParseForwardMethodError(invalid.to_owned())),
        }
    }
}

impl fmt::Display for ForwardMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ForwardMethod::GET => write!(f, "GET"),
            ForwardMethod::POST => write!(f, "POST"),
        }
    }
}

impl From<ForwardMethod> for http::Method {
    fn from(val: ForwardMethod) -> Self {
        match val {
            ForwardMethod::GET => http::Method::GET,
            ForwardMethod::POST => http::Method::POST,
        }
    }
}

/// Where to relay the live count for a single inbound event.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ForwardTarget {
    pub endpoint: String,
    pub method: ForwardMethod,
}

/// JSON body of a POST notification.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CountPayload {
    pub unique_count: u64,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification to {endpoint} could not be delivered: {error}")]
    Request {
        endpoint: String,
        error: reqwest::Error,
    },
}

#[async_trait]
pub trait Notifier {
    /// Make a single attempt to deliver `count` to the target. The response
    /// status is returned as-is and never interpreted.
    async fn notify(&self, target: &ForwardTarget, count: u64) -> Result<StatusCode, NotifyError>;
}

pub struct HttpNotifier {
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(request_timeout: time::Duration) -> Result<HttpNotifier, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("unique-counter notifier")
            .timeout(request_timeout)
            .build()?;

        Ok(HttpNotifier { client })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, target: &ForwardTarget, count: u64) -> Result<StatusCode, NotifyError> {
        let request = match target.method {
            ForwardMethod::GET => self
                .client
                .get(&target.endpoint)
                .query(&[("count", count)]),
            // json() also sets the content type
            ForwardMethod::POST => self
                .client
                .post(&target.endpoint)
                .json(&CountPayload {
                    unique_count: count,
                }),
        };

        let response = request.send().await.map_err(|error| NotifyError::Request {
            endpoint: target.endpoint.clone(),
            error,
        })?;

        Ok(response.status())
    }
}

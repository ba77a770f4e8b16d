//! Test doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::header::{self, HeaderValue};
use reqwest::{StatusCode, Url};

use crate::error::{Error, Result};
use crate::fetch::{FetchRequest, ResponseSnapshot};
use crate::network::Network;

pub const ORIGIN: &str = "http://localhost:8787";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn get(path: &str) -> FetchRequest {
    FetchRequest::get(url(path))
}

pub fn navigate(path: &str) -> FetchRequest {
    get(path).accepting_html()
}

pub fn text(status: u16, body: &str) -> ResponseSnapshot {
    let mut response = ResponseSnapshot::new(StatusCode::from_u16(status).unwrap(), body.to_string());
    response
        .headers
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

#[derive(Debug, Clone)]
enum Scripted {
    Respond(ResponseSnapshot),
    Fail,
}

/// Network double answering from per-URL scripts.
///
/// Each URL has a queue of outcomes; the last one repeats forever. Unscripted
/// URLs fail like an unreachable host.
#[derive(Debug, Default)]
pub struct ScriptedNetwork {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<FetchRequest>>,
    offline: AtomicBool,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, path: &str, outcome: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url(path).to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn respond(&self, path: &str, status: u16, body: &str) -> &Self {
        self.push(path, Scripted::Respond(text(status, body)));
        self
    }

    pub fn respond_with(&self, path: &str, response: ResponseSnapshot) -> &Self {
        self.push(path, Scripted::Respond(response));
        self
    }

    pub fn fail(&self, path: &str) -> &Self {
        self.push(path, Scripted::Fail);
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_for(&self, path: &str) -> usize {
        let target = url(path);
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == target)
            .count()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
        self.requests.lock().unwrap().push(request.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("offline".to_string()));
        }

        let outcome = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.get_mut(request.url.as_str()).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
        };

        match outcome {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail) => Err(Error::Network(format!("connection refused: {}", request.url))),
            None => Err(Error::Network(format!("no route to {}", request.url))),
        }
    }
}

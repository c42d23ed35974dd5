#![allow(dead_code)]

use async_trait::async_trait;
use catalog_ingest::http::{HttpMethod, HttpRequest, ResponseEnvelope, Transport, TransportError};
use std::collections::VecDeque;
use std::sync::Mutex;

struct Route {
    method: HttpMethod,
    prefix: String,
    responses: VecDeque<Result<ResponseEnvelope, String>>,
}

/// Transport that answers from scripted routes and records every request.
/// A route matches on method and URL prefix; its responses are served in
/// order and the last one repeats.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, method: HttpMethod, prefix: &str, response: ResponseEnvelope) -> Self {
        self.push(method, prefix, Ok(response))
    }

    pub fn route_error(self, method: HttpMethod, prefix: &str, reason: &str) -> Self {
        self.push(method, prefix, Err(reason.to_string()))
    }

    fn push(
        self,
        method: HttpMethod,
        prefix: &str,
        response: Result<ResponseEnvelope, String>,
    ) -> Self {
        {
            let mut routes = self.routes.lock().unwrap();
            match routes.iter_mut().find(|r| r.method == method && r.prefix == prefix) {
                Some(route) => route.responses.push_back(response),
                None => routes.push(Route {
                    method,
                    prefix: prefix.to_string(),
                    responses: VecDeque::from(vec![response]),
                }),
            }
        }
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: HttpMethod, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<ResponseEnvelope, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut routes = self.routes.lock().unwrap();
        // longest matching prefix wins
        let route = routes
            .iter_mut()
            .filter(|r| r.method == request.method && request.url.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len())
            .ok_or_else(|| TransportError(format!("no route for {}", request.url)))?;
        let response = if route.responses.len() > 1 {
            route.responses.pop_front()
        } else {
            route.responses.front().cloned()
        };
        match response {
            Some(Ok(envelope)) => Ok(envelope),
            Some(Err(reason)) => Err(TransportError(reason)),
            None => Err(TransportError(format!("no response for {}", request.url))),
        }
    }
}

//! Shared test fixtures

use std::sync::Arc;

use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::inference::{FragmentStream, InferenceBackend, InferenceRequest};

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_http(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}/", addr)
}

/// Backend that replays fixed fragments and records every request
#[derive(Default)]
pub struct ScriptedBackend {
    fragments: Vec<&'static str>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedBackend {
    pub fn new(fragments: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            fragments: fragments.to_vec(),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().clone()
    }
}

impl InferenceBackend for ScriptedBackend {
    fn stream(&self, request: InferenceRequest, _cancel: CancellationToken) -> FragmentStream {
        self.requests.lock().push(request);
        let fragments: Vec<String> = self.fragments.iter().map(|f| f.to_string()).collect();
        Box::pin(futures::stream::iter(fragments))
    }
}

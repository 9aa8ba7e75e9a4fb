use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use talkwire_client::{PollClient, TransportError};
use tokio::time::Instant;

#[derive(Default)]
struct ScriptState {
    script: VecDeque<Result<String, TransportError>>,
    pulls: Vec<Instant>,
    pushes: Vec<String>,
}

/// Poll client answering pulls from a script. Once the script runs out,
/// pulls hang like an idle long-poll.
#[derive(Clone, Default)]
pub struct ScriptedPollClient {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedPollClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, body: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .script
            .push_back(Ok(body.to_owned()));
        self
    }

    pub fn fail(&self, times: usize) -> &Self {
        let mut state = self.state.lock().unwrap();
        for _ in 0..times {
            state
                .script
                .push_back(Err(TransportError::Request("503 Service Unavailable".to_owned())));
        }
        self
    }

    pub fn pull_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().pulls.clone()
    }

    pub fn pushes(&self) -> Vec<String> {
        self.state.lock().unwrap().pushes.clone()
    }
}

#[async_trait]
impl PollClient for ScriptedPollClient {
    async fn pull(&self) -> Result<String, TransportError> {
        let next = {
            let mut state = self.state.lock().unwrap();
            state.pulls.push(Instant::now());
            state.script.pop_front()
        };
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn push(&self, messages: String) -> Result<(), TransportError> {
        self.state.lock().unwrap().pushes.push(messages);
        Ok(())
    }
}

//! Scripted status ping.

use std::{
    collections::VecDeque,
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use mccontrol_core::StatusPinger;
use serde_json::{Value, json};

/// In-memory [`StatusPinger`]. Unscripted pings answer with a default document.
#[derive(Clone, Default)]
pub struct FakePinger {
    responses: Arc<Mutex<VecDeque<Result<(Value, u64), io::ErrorKind>>>>,
    pings: Arc<AtomicUsize>,
}

impl FakePinger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: Result<(Value, u64), io::ErrorKind>) {
        self.responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(response);
    }

    #[must_use]
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

/// A typical properties document.
#[must_use]
pub fn sample_properties() -> Value {
    json!({
        "version": {"name": "1.20.4", "protocol": 765},
        "players": {"max": 20, "online": 2, "sample": [{"id": "0000", "name": "Steve"}]},
        "description": {"text": "NewNan ", "extra": [{"text": "City", "color": "gold"}]},
        "favicon": "",
    })
}

#[async_trait]
impl StatusPinger for FakePinger {
    async fn ping(&self, _address: &str, _port: u16) -> io::Result<(Value, u64)> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        let next = self
            .responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(kind)) => Err(io::Error::new(kind, format!("scripted {kind:?}"))),
            None => Ok((sample_properties(), 5)),
        }
    }
}

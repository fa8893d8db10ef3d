use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use tokio::sync::broadcast;

/// How many events a subscriber may lag behind before old ones are dropped.
const CHANNEL_CAPACITY: usize = 256;

/// Events for a workspace job started with `run`.
///
/// For any one key, `Exit` is the last event delivered. The launcher and
/// reaper only emit it after the registry entry for the key has been
/// removed, so an observer of `Exit` may immediately start a new process
/// under the same key.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ProcessEvent {
    Log { output: String },
    Error { message: String },
    Exit { code: Option<i32>, message: String },
}

/// Events for an interactive terminal session, keyed by connection id.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TerminalEvent {
    #[serde(rename = "terminal:log")]
    Log { output: String },
    #[serde(rename = "terminal:error")]
    Error { message: String },
    #[serde(rename = "terminal:exit")]
    Exit { code: Option<i32> },
}

/// Events for a streaming template application, keyed by job id.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TemplateEvent {
    #[serde(rename = "template:progress")]
    Progress { message: String },
    #[serde(rename = "template:success")]
    Success { message: String },
    #[serde(rename = "template:error")]
    Error { error: String },
}

/// Per-key broadcast hub.
///
/// One sender per logical key (workspace name, session id, job id); events
/// for independent keys never contend. Subscribing to a key that has not
/// emitted yet creates the channel so no events race the subscription.
#[derive(Debug)]
pub struct EventHub<E> {
    channels: StdMutex<HashMap<String, broadcast::Sender<E>>>,
}

impl<E: Clone> EventHub<E> {
    pub fn new() -> Self {
        Self {
            channels: StdMutex::new(HashMap::new()),
        }
    }

    fn sender(&self, key: &str) -> broadcast::Sender<E> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    pub fn subscribe(&self, key: &str) -> broadcast::Receiver<E> {
        self.sender(key).subscribe()
    }

    /// Broadcast an event to all current subscribers of `key`.
    pub fn emit(&self, key: &str, event: E) {
        // send() only fails when there are no receivers; that is fine.
        let _ = self.sender(key).send(event);
    }

    /// Broadcast a final event and tear the channel down.
    ///
    /// Subscribers receive the event and then observe the stream closing,
    /// which lets SSE/WS forwarders terminate cleanly.
    pub fn emit_final(&self, key: &str, event: E) {
        let sender = {
            let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
            channels.remove(key)
        };
        if let Some(sender) = sender {
            let _ = sender.send(event);
        }
    }

    /// Drop the channel for `key` without emitting anything.
    pub fn remove(&self, key: &str) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.remove(key);
    }
}

impl<E: Clone> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_delivered_in_order_and_exit_is_last() {
        let hub: EventHub<ProcessEvent> = EventHub::new();
        let mut rx = hub.subscribe("web");

        hub.emit(
            "web",
            ProcessEvent::Log {
                output: "one".into(),
            },
        );
        hub.emit(
            "web",
            ProcessEvent::Log {
                output: "two".into(),
            },
        );
        hub.emit_final(
            "web",
            ProcessEvent::Exit {
                code: Some(0),
                message: "Process exited with code 0".into(),
            },
        );

        assert!(matches!(rx.recv().await, Ok(ProcessEvent::Log { output }) if output == "one"));
        assert!(matches!(rx.recv().await, Ok(ProcessEvent::Log { output }) if output == "two"));
        assert!(matches!(rx.recv().await, Ok(ProcessEvent::Exit { code: Some(0), .. })));
        // Channel closed after the final event.
        assert!(rx.recv().await.is_err());
    }

    #[tokio::test]
    async fn independent_keys_do_not_cross() {
        let hub: EventHub<ProcessEvent> = EventHub::new();
        let mut rx_a = hub.subscribe("a");
        let mut rx_b = hub.subscribe("b");

        hub.emit(
            "a",
            ProcessEvent::Log {
                output: "for-a".into(),
            },
        );

        assert!(matches!(rx_a.recv().await, Ok(ProcessEvent::Log { output }) if output == "for-a"));
        assert!(matches!(
            rx_b.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn terminal_events_serialize_with_prefixed_names() {
        let event = TerminalEvent::Exit { code: Some(127) };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "terminal:exit");
        assert_eq!(json["code"], 127);
    }
}

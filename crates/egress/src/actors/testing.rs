//! Test helpers: a listening actor that records what it is sent

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use egress_runtime::{Actor, ActorContext, ActorResult, ActorSpec, ActorSystem, Envelope};

use crate::messages::{Message, post};

/// Messages received by a listener, with their senders
#[derive(Clone, Default)]
pub(crate) struct Inbox(Arc<Mutex<Vec<(String, Message)>>>);

impl Inbox {
    pub(crate) fn messages(&self) -> Vec<Message> {
        self.0.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub(crate) fn count(&self, kind: &str) -> usize {
        self.0.lock().iter().filter(|(_, m)| m.kind() == kind).count()
    }

    pub(crate) fn senders(&self) -> Vec<String> {
        self.0.lock().iter().map(|(from, _)| from.clone()).collect()
    }
}

struct Listener {
    address: String,
    inbox: Inbox,
    /// Sent back to whoever writes in
    reply: Option<Message>,
}

#[async_trait]
impl Actor for Listener {
    fn spec(&self) -> ActorSpec {
        ActorSpec::new(&self.address)
    }

    async fn on_message(&mut self, ctx: &ActorContext, envelope: Envelope) -> ActorResult<()> {
        if let Ok(message) = Message::decode(&envelope) {
            self.inbox.0.lock().push((envelope.from.clone(), message));
        }
        if let Some(reply) = &self.reply {
            post(ctx, &envelope.from, reply).await?;
        }
        Ok(())
    }
}

fn spawn(system: &ActorSystem, address: &str, reply: Option<Message>) -> Inbox {
    let inbox = Inbox::default();
    system
        .spawn(Listener {
            address: address.to_string(),
            inbox: inbox.clone(),
            reply,
        })
        .unwrap();
    inbox
}

/// Spawn a listener at `address`
pub(crate) fn listen(system: &ActorSystem, address: &str) -> Inbox {
    spawn(system, address, None)
}

/// Spawn a listener at `address` that answers every message with `reply`
pub(crate) fn answer(system: &ActorSystem, address: &str, reply: Message) -> Inbox {
    spawn(system, address, Some(reply))
}

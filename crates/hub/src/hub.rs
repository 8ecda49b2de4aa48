//! Registry owner and routing policy.
//!
//! All registry mutation happens inside [`Hub::run`]; the rest of the
//! process talks to it through a cloneable [`HubHandle`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use slidecast_protocol::{Command, Message, Status};

use crate::{ClientId, HubError, MailboxSender, Role};

const REGISTER_BUFFER: usize = 64;
const UNREGISTER_BUFFER: usize = 64;
const INBOUND_BUFFER: usize = 256;

struct RegisterRequest {
    role: Role,
    mailbox: MailboxSender,
    reply: oneshot::Sender<Result<ClientId, HubError>>,
}

struct Inbound {
    origin: ClientId,
    message: Arc<Message>,
}

/// Front end of the hub task.
#[derive(Debug, Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<RegisterRequest>,
    unregister_tx: mpsc::Sender<ClientId>,
    inbound_tx: mpsc::Sender<Inbound>,
}

impl HubHandle {
    /// Registers a connection and returns its identity.
    ///
    /// The greeting for the new connection is already queued in its mailbox
    /// when this returns. Fails with [`HubError::PresenterTaken`] when a
    /// presenter claim arrives while another presenter is registered.
    pub async fn register(&self, role: Role, mailbox: MailboxSender) -> Result<ClientId, HubError> {
        let (reply, rx) = oneshot::channel();
        self.register_tx
            .send(RegisterRequest {
                role,
                mailbox,
                reply,
            })
            .await
            .map_err(|_| HubError::HubClosed)?;
        rx.await.map_err(|_| HubError::HubClosed)?
    }

    /// Removes a connection. Unknown or already removed ids are ignored.
    pub async fn unregister(&self, id: ClientId) -> Result<(), HubError> {
        self.unregister_tx
            .send(id)
            .await
            .map_err(|_| HubError::HubClosed)
    }

    /// Hands an inbound message from `origin` to the routing policy.
    pub async fn route(&self, origin: ClientId, message: Message) -> Result<(), HubError> {
        self.inbound_tx
            .send(Inbound {
                origin,
                message: Arc::new(message),
            })
            .await
            .map_err(|_| HubError::HubClosed)
    }
}

struct Client {
    role: Role,
    mailbox: MailboxSender,
}

/// The hub task state.
pub struct Hub {
    clients: BTreeMap<ClientId, Client>,
    presenter: Option<ClientId>,
    last_id: ClientId,
    register_rx: mpsc::Receiver<RegisterRequest>,
    unregister_rx: mpsc::Receiver<ClientId>,
    inbound_rx: mpsc::Receiver<Inbound>,
}

impl Hub {
    /// Creates the hub and its handle. Call [`Hub::run`] to start routing.
    pub fn new() -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(REGISTER_BUFFER);
        let (unregister_tx, unregister_rx) = mpsc::channel(UNREGISTER_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);

        let hub = Self {
            clients: BTreeMap::new(),
            presenter: None,
            last_id: 0,
            register_rx,
            unregister_rx,
            inbound_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            inbound_tx,
        };
        (hub, handle)
    }

    /// Creates the hub and runs it on a new task.
    pub fn spawn() -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new();
        (handle, tokio::spawn(hub.run()))
    }

    /// Processes commands until every [`HubHandle`] is dropped.
    pub async fn run(mut self) {
        debug!("hub started");
        loop {
            tokio::select! {
                Some(req) = self.register_rx.recv() => {
                    let result = self.register(req.role, req.mailbox);
                    if let Err(Ok(id)) = req.reply.send(result) {
                        self.remove(id, "registration abandoned");
                    }
                }
                Some(id) = self.unregister_rx.recv() => self.remove(id, "unregistered"),
                Some(inbound) = self.inbound_rx.recv() => self.route(inbound.origin, inbound.message),
                else => break,
            }
        }
        debug!("hub stopped");
    }

    fn register(&mut self, role: Role, mailbox: MailboxSender) -> Result<ClientId, HubError> {
        if role == Role::Presenter {
            if let Some(current) = self.presenter {
                warn!(presenter = current, "presenter already registered, rejecting claim");
                return Err(HubError::PresenterTaken);
            }
        }

        self.last_id += 1;
        let id = self.last_id;

        let mut greeting = Message::new(Command::Connected, id).with_status(Status::SelfConnected);
        if role == Role::Presenter {
            greeting = greeting.with_client_numbers(self.clients.keys().copied().collect());
        }

        self.clients.insert(id, Client { role, mailbox });
        match role {
            Role::Presenter => {
                info!(client = id, "presenter registered");
                self.presenter = Some(id);
            }
            Role::Viewer => debug!(client = id, "viewer registered"),
        }

        if let Some(greeting) = seal(greeting) {
            self.deliver(id, greeting);
        }
        if role == Role::Viewer {
            self.notify_presenter(id, Status::Connected);
        }

        Ok(id)
    }

    /// Drops a connection from the registry. Dropping its mailbox sender
    /// closes the mailbox, which tells the write cycle to shut down.
    fn remove(&mut self, id: ClientId, reason: &'static str) {
        let Some(client) = self.clients.remove(&id) else {
            trace!(client = id, reason, "already removed");
            return;
        };
        drop(client.mailbox);

        match client.role {
            Role::Presenter => {
                if self.presenter == Some(id) {
                    self.presenter = None;
                }
                info!(client = id, reason, "presenter left");
            }
            Role::Viewer => {
                debug!(client = id, reason, "viewer left");
                self.notify_presenter(id, Status::Disconnected);
            }
        }
    }

    fn route(&mut self, origin: ClientId, message: Arc<Message>) {
        trace!(client = origin, command = %message.command, raw = message.raw(), "routing");

        match message.command {
            Command::StatusRequest => self.route_status_request(origin, message),

            Command::ClientStats => match self.presenter {
                Some(presenter) => self.deliver_to_presenter(presenter, message),
                None => trace!(client = origin, "no presenter, dropping client stats"),
            },

            Command::HideControls
            | Command::ShowControls
            | Command::Slided
            | Command::Paused
            | Command::Resumed
            | Command::StatusReply
            | Command::OverviewShown
            | Command::OverviewHidden
            | Command::Connected
            | Command::FragmentShown
            | Command::DisplayNotification
            | Command::Other(_) => self.broadcast(message),
        }
    }

    fn route_status_request(&mut self, origin: ClientId, message: Arc<Message>) {
        if let Some(presenter) = self.presenter {
            self.deliver_to_presenter(presenter, message);
            return;
        }

        if !self.clients.contains_key(&origin) {
            trace!(client = origin, "status request from unknown client, dropping");
            return;
        }

        debug!(client = origin, "presenter missing, replying status unknown");
        let reply = Message::new(Command::StatusReply, origin).with_status(Status::Unknown);
        if let Some(reply) = seal(reply) {
            self.deliver(origin, reply);
        }
    }

    /// Sends to every connection except the presenter.
    fn broadcast(&mut self, message: Arc<Message>) {
        let recipients: Vec<ClientId> = self
            .clients
            .keys()
            .copied()
            .filter(|id| Some(*id) != self.presenter)
            .collect();

        for id in recipients {
            self.deliver(id, Arc::clone(&message));
        }
    }

    fn notify_presenter(&mut self, subject: ClientId, status: Status) {
        let Some(presenter) = self.presenter else {
            return;
        };
        let stats = Message::new(Command::ClientStats, subject).with_status(status);
        if let Some(stats) = seal(stats) {
            self.deliver_to_presenter(presenter, stats);
        }
    }

    /// Like `deliver`, but a full mailbox drops the message and keeps the
    /// presenter registered.
    fn deliver_to_presenter(&mut self, id: ClientId, message: Arc<Message>) {
        let Some(client) = self.clients.get(&id) else {
            return;
        };
        match client.mailbox.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!(client = id, command = %dropped.command, "presenter mailbox full, dropping message");
            }
            Err(TrySendError::Closed(_)) => self.remove(id, "mailbox closed"),
        }
    }

    /// Non-blocking enqueue. A full or closed mailbox evicts the recipient.
    fn deliver(&mut self, id: ClientId, message: Arc<Message>) {
        let Some(client) = self.clients.get(&id) else {
            return;
        };
        match client.mailbox.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(client = id, "mailbox full, evicting slow consumer");
                self.remove(id, "evicted");
            }
            Err(TrySendError::Closed(_)) => self.remove(id, "mailbox closed"),
        }
    }
}

fn seal(message: Message) -> Option<Arc<Message>> {
    let command = message.command;
    match message.sealed() {
        Ok(sealed) => Some(Arc::new(sealed)),
        Err(e) => {
            error!(%command, "failed to encode message: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::time::timeout;

    use super::*;
    use crate::{MailboxReceiver, mailbox};

    async fn recv(rx: &mut MailboxReceiver) -> Arc<Message> {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("mailbox closed")
    }

    async fn assert_closed(rx: &mut MailboxReceiver) {
        let next = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for close");
        assert!(next.is_none(), "expected closed mailbox, got {next:?}");
    }

    async fn join(hub: &HubHandle, role: Role) -> (ClientId, MailboxReceiver) {
        let (tx, mut rx) = mailbox();
        let id = hub.register(role, tx).await.unwrap();
        let greeting = recv(&mut rx).await;
        assert_eq!(greeting.command, Command::Connected);
        assert_eq!(greeting.client_number, id);
        (id, rx)
    }

    fn msg(command: Command, origin: ClientId) -> Message {
        Message::new(command, origin).sealed().unwrap()
    }

    #[tokio::test]
    async fn ids_are_sequential() {
        let (hub, _task) = Hub::spawn();
        let (a, _ra) = join(&hub, Role::Viewer).await;
        let (b, _rb) = join(&hub, Role::Viewer).await;
        let (c, _rc) = join(&hub, Role::Presenter).await;
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[tokio::test]
    async fn presenter_greeting_lists_other_clients() {
        let (hub, _task) = Hub::spawn();
        let (_, _r1) = join(&hub, Role::Viewer).await;
        let (_, _r2) = join(&hub, Role::Viewer).await;

        let (tx, mut rx) = mailbox();
        let id = hub.register(Role::Presenter, tx).await.unwrap();
        let greeting = recv(&mut rx).await;
        assert_eq!(greeting.status, Some(Status::SelfConnected));
        assert_eq!(greeting.client_numbers, vec![1, 2]);
        assert_eq!(
            greeting.raw(),
            format!(r#"{{"com":10,"c":{id},"cn":[1,2],"s":5}}"#)
        );
    }

    #[tokio::test]
    async fn viewer_greeting_has_no_roster() {
        let (hub, _task) = Hub::spawn();
        let (tx, mut rx) = mailbox();
        hub.register(Role::Viewer, tx).await.unwrap();
        let greeting = recv(&mut rx).await;
        assert!(greeting.client_numbers.is_empty());
        assert_eq!(greeting.raw(), r#"{"com":10,"c":1,"s":5}"#);
    }

    #[tokio::test]
    async fn presenter_is_told_about_new_viewers() {
        let (hub, _task) = Hub::spawn();
        let (_, mut presenter) = join(&hub, Role::Presenter).await;
        let (viewer, _rv) = join(&hub, Role::Viewer).await;

        let stats = recv(&mut presenter).await;
        assert_eq!(stats.command, Command::ClientStats);
        assert_eq!(stats.status, Some(Status::Connected));
        assert_eq!(stats.client_number, viewer);
    }

    #[tokio::test]
    async fn second_presenter_is_rejected() {
        let (hub, _task) = Hub::spawn();
        let (first, mut presenter) = join(&hub, Role::Presenter).await;

        let (tx, _rx) = mailbox();
        let err = hub.register(Role::Presenter, tx).await.unwrap_err();
        assert!(matches!(err, HubError::PresenterTaken));

        // The first presenter still receives presenter-only traffic.
        let (viewer, _rv) = join(&hub, Role::Viewer).await;
        let stats = recv(&mut presenter).await;
        assert_eq!(stats.client_number, viewer);
        assert_ne!(first, viewer);
    }

    #[tokio::test]
    async fn presenter_slot_frees_after_unregister() {
        let (hub, _task) = Hub::spawn();
        let (first, mut rx) = join(&hub, Role::Presenter).await;
        hub.unregister(first).await.unwrap();
        assert_closed(&mut rx).await;

        let (second, _rx2) = join(&hub, Role::Presenter).await;
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn broadcast_skips_presenter() {
        let (hub, _task) = Hub::spawn();
        let (presenter, mut rp) = join(&hub, Role::Presenter).await;
        let (_, mut r1) = join(&hub, Role::Viewer).await;
        let (_, mut r2) = join(&hub, Role::Viewer).await;
        // Drain the two viewer-connected notifications.
        recv(&mut rp).await;
        recv(&mut rp).await;

        let slided = msg(Command::Slided, presenter);
        hub.route(presenter, slided.clone()).await.unwrap();

        assert_eq!(recv(&mut r1).await.raw(), slided.raw());
        assert_eq!(recv(&mut r2).await.raw(), slided.raw());
        assert!(matches!(rp.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn unknown_commands_are_broadcast() {
        let (hub, _task) = Hub::spawn();
        let (viewer, mut rv) = join(&hub, Role::Viewer).await;
        let other = Message::decode(r#"{"com":77,"c":1}"#).unwrap();
        hub.route(viewer, other).await.unwrap();
        assert_eq!(recv(&mut rv).await.command, Command::Other(77));
    }

    #[tokio::test]
    async fn status_request_goes_to_presenter() {
        let (hub, _task) = Hub::spawn();
        let (_, mut rp) = join(&hub, Role::Presenter).await;
        let (viewer, mut rv) = join(&hub, Role::Viewer).await;
        recv(&mut rp).await;

        let request = msg(Command::StatusRequest, viewer);
        hub.route(viewer, request.clone()).await.unwrap();

        assert_eq!(recv(&mut rp).await.raw(), request.raw());
        assert!(matches!(rv.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn status_request_without_presenter_gets_canned_reply() {
        let (hub, _task) = Hub::spawn();
        let (asker, mut ra) = join(&hub, Role::Viewer).await;
        let (_, mut rb) = join(&hub, Role::Viewer).await;

        hub.route(asker, msg(Command::StatusRequest, asker))
            .await
            .unwrap();

        let reply = recv(&mut ra).await;
        assert_eq!(reply.command, Command::StatusReply);
        assert_eq!(reply.status, Some(Status::Unknown));
        assert!(matches!(ra.try_recv(), Err(TryRecvError::Empty)));
        assert!(matches!(rb.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn status_request_from_unknown_origin_is_dropped() {
        let (hub, _task) = Hub::spawn();
        let (_, mut rv) = join(&hub, Role::Viewer).await;
        hub.route(99, msg(Command::StatusRequest, 99)).await.unwrap();
        // A later broadcast proves the request was processed first.
        hub.route(99, msg(Command::Paused, 99)).await.unwrap();
        assert_eq!(recv(&mut rv).await.command, Command::Paused);
    }

    #[tokio::test]
    async fn client_stats_only_reach_presenter() {
        let (hub, _task) = Hub::spawn();
        let (_, mut rp) = join(&hub, Role::Presenter).await;
        let (viewer, mut rv) = join(&hub, Role::Viewer).await;
        let (_, mut other) = join(&hub, Role::Viewer).await;
        recv(&mut rp).await;
        recv(&mut rp).await;

        let stats = Message::new(Command::ClientStats, viewer)
            .with_status(Status::FocusedOut)
            .sealed()
            .unwrap();
        hub.route(viewer, stats.clone()).await.unwrap();

        assert_eq!(recv(&mut rp).await.raw(), stats.raw());
        assert!(matches!(rv.try_recv(), Err(TryRecvError::Empty)));
        assert!(matches!(other.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn client_stats_without_presenter_are_dropped() {
        let (hub, _task) = Hub::spawn();
        let (viewer, mut rv) = join(&hub, Role::Viewer).await;
        hub.route(viewer, msg(Command::ClientStats, viewer))
            .await
            .unwrap();
        hub.route(viewer, msg(Command::Resumed, viewer))
            .await
            .unwrap();
        assert_eq!(recv(&mut rv).await.command, Command::Resumed);
    }

    #[tokio::test]
    async fn viewer_disconnect_notifies_presenter_once() {
        let (hub, _task) = Hub::spawn();
        let (_, mut rp) = join(&hub, Role::Presenter).await;
        let (viewer, mut rv) = join(&hub, Role::Viewer).await;
        recv(&mut rp).await;

        hub.unregister(viewer).await.unwrap();
        hub.unregister(viewer).await.unwrap();
        assert_closed(&mut rv).await;

        let gone = recv(&mut rp).await;
        assert_eq!(gone.command, Command::ClientStats);
        assert_eq!(gone.status, Some(Status::Disconnected));
        assert_eq!(gone.client_number, viewer);

        // The next presenter-bound message is about a new viewer, not a
        // second disconnect.
        let (next, _rn) = join(&hub, Role::Viewer).await;
        let joined = recv(&mut rp).await;
        assert_eq!(joined.status, Some(Status::Connected));
        assert_eq!(joined.client_number, next);
    }

    #[tokio::test]
    async fn presenter_disconnect_restores_canned_reply() {
        let (hub, _task) = Hub::spawn();
        let (presenter, mut rp) = join(&hub, Role::Presenter).await;
        let (viewer, mut rv) = join(&hub, Role::Viewer).await;
        recv(&mut rp).await;

        hub.unregister(presenter).await.unwrap();
        assert_closed(&mut rp).await;
        hub.route(viewer, msg(Command::StatusRequest, viewer))
            .await
            .unwrap();

        let reply = recv(&mut rv).await;
        assert_eq!(reply.command, Command::StatusReply);
        assert_eq!(reply.status, Some(Status::Unknown));
    }

    #[tokio::test]
    async fn full_mailbox_evicts_recipient() {
        let (hub, _task) = Hub::spawn();
        let (sender, mut rs) = join(&hub, Role::Viewer).await;

        // The slow viewer never drains; the greeting takes one slot.
        let (slow_tx, mut slow_rx) = mailbox();
        hub.register(Role::Viewer, slow_tx).await.unwrap();

        // The sender hears its own broadcasts, so each one it receives has
        // already been offered to the slow viewer.
        let total = crate::MAILBOX_CAPACITY + 3;
        for n in 0..total {
            let m = Message::new(Command::Slided, sender)
                .with_text(n.to_string())
                .sealed()
                .unwrap();
            hub.route(sender, m).await.unwrap();
            assert_eq!(recv(&mut rs).await.message, n.to_string());
        }

        let mut received = Vec::new();
        while let Some(m) = timeout(Duration::from_secs(2), slow_rx.recv())
            .await
            .expect("timed out draining")
        {
            received.push(m);
        }

        // Greeting plus the broadcasts that fit; nothing after the overflow.
        assert_eq!(received.len(), crate::MAILBOX_CAPACITY);
        assert_eq!(received[0].command, Command::Connected);
        let last = received.last().unwrap();
        assert_eq!(last.message, "13");
    }

    #[tokio::test]
    async fn full_presenter_mailbox_drops_telemetry_without_eviction() {
        let (hub, _task) = Hub::spawn();
        // The presenter never drains; the greeting takes one slot.
        let (tx, mut rp) = mailbox();
        let presenter = hub.register(Role::Presenter, tx).await.unwrap();

        let mut viewers = Vec::new();
        for _ in 0..crate::MAILBOX_CAPACITY + 2 {
            viewers.push(join(&hub, Role::Viewer).await);
        }
        let asker = viewers[0].0;
        hub.route(asker, msg(Command::StatusRequest, asker))
            .await
            .unwrap();
        // A later broadcast proves the request was processed first.
        hub.route(asker, msg(Command::Paused, asker)).await.unwrap();
        assert_eq!(recv(&mut viewers[0].1).await.command, Command::Paused);

        // Still the presenter: a second claim is refused.
        let (tx, _rx) = mailbox();
        let err = hub.register(Role::Presenter, tx).await.unwrap_err();
        assert!(matches!(err, HubError::PresenterTaken));

        // Greeting plus the notifications that fit. The overflow was dropped.
        let mut received = Vec::new();
        while let Ok(m) = rp.try_recv() {
            received.push(m);
        }
        assert_eq!(received.len(), crate::MAILBOX_CAPACITY);
        assert_eq!(received[0].client_number, presenter);
        assert_eq!(
            received.last().unwrap().client_number,
            viewers[crate::MAILBOX_CAPACITY - 2].0
        );

        // Once drained, presenter-bound traffic flows again.
        let stats = Message::new(Command::ClientStats, asker)
            .with_status(Status::FocusedIn)
            .sealed()
            .unwrap();
        hub.route(asker, stats.clone()).await.unwrap();
        assert_eq!(recv(&mut rp).await.raw(), stats.raw());
    }

    #[tokio::test]
    async fn eviction_does_not_affect_other_viewers() {
        let (hub, _task) = Hub::spawn();
        let (_, mut rp) = join(&hub, Role::Presenter).await;
        let (sender, mut fast) = join(&hub, Role::Viewer).await;
        let (slow_tx, _slow_rx) = mailbox();
        let slow = hub.register(Role::Viewer, slow_tx).await.unwrap();
        recv(&mut rp).await;
        recv(&mut rp).await;

        for _ in 0..crate::MAILBOX_CAPACITY {
            hub.route(sender, msg(Command::Slided, sender)).await.unwrap();
            assert_eq!(recv(&mut fast).await.command, Command::Slided);
        }

        // The presenter hears about the evicted viewer exactly once.
        let gone = recv(&mut rp).await;
        assert_eq!(gone.status, Some(Status::Disconnected));
        assert_eq!(gone.client_number, slow);
        hub.unregister(slow).await.unwrap();
        hub.route(sender, msg(Command::ClientStats, sender))
            .await
            .unwrap();
        assert_eq!(recv(&mut rp).await.client_number, sender);
    }

    #[tokio::test]
    async fn closed_mailbox_is_removed_on_delivery() {
        let (hub, _task) = Hub::spawn();
        let (_, mut rp) = join(&hub, Role::Presenter).await;
        let (tx, rx) = mailbox();
        let viewer = hub.register(Role::Viewer, tx).await.unwrap();
        drop(rx);
        recv(&mut rp).await;

        hub.route(viewer, msg(Command::Paused, viewer)).await.unwrap();
        let gone = recv(&mut rp).await;
        assert_eq!(gone.status, Some(Status::Disconnected));
        assert_eq!(gone.client_number, viewer);
    }

    #[tokio::test]
    async fn hub_stops_when_handles_drop() {
        let (hub, task) = Hub::spawn();
        drop(hub);
        timeout(Duration::from_secs(2), task)
            .await
            .expect("hub should stop")
            .expect("no panic");
    }
}

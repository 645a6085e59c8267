//! Per-update dispatch: authorize → lock store → route → reply or capture → unlock.

use std::{path::PathBuf, sync::Arc};

use crate::{
    commands::{route, Action},
    config::{Config, ImageSize},
    domain::{ChatId, IncomingMessage},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, ReplyOptions},
    },
    ports::Camera,
    security::{authorize, AllowList, AuthRejection},
    session::SessionStore,
    status::StatusProvider,
};

/// What happened to one update.
///
/// Several of these are invisible to the user; they stay distinct so callers
/// and tests can tell which silent path was taken.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Text reply delivered.
    Replied,
    /// Captured image delivered.
    PhotoSent,
    /// Sender failed the allow-list check. Nothing sent.
    Rejected(AuthRejection),
    /// Sender allowed but no session record. Nothing sent.
    NoSession,
    /// Camera failed. Nothing sent to the user.
    CaptureFailed(String),
    /// Transport refused the text or photo.
    DeliveryFailed(String),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Replied | DispatchOutcome::PhotoSent)
    }
}

pub struct Dispatcher {
    allowed: AllowList,
    store: SessionStore,
    messenger: Arc<dyn MessagingPort>,
    camera: Arc<dyn Camera>,
    status: Arc<dyn StatusProvider>,
    temp_dir: PathBuf,
    image_size: ImageSize,
    reply_opts: ReplyOptions,
}

impl Dispatcher {
    pub fn new(
        cfg: &Config,
        messenger: Arc<dyn MessagingPort>,
        camera: Arc<dyn Camera>,
        status: Arc<dyn StatusProvider>,
    ) -> Self {
        let store = SessionStore::from_allow_list(&cfg.allowed_users);
        Self::with_store(cfg, store, messenger, camera, status)
    }

    pub fn with_store(
        cfg: &Config,
        store: SessionStore,
        messenger: Arc<dyn MessagingPort>,
        camera: Arc<dyn Camera>,
        status: Arc<dyn StatusProvider>,
    ) -> Self {
        Self {
            allowed: cfg.allowed_users.clone(),
            store,
            messenger,
            camera,
            status,
            temp_dir: cfg.temp_dir.clone(),
            image_size: cfg.image_size,
            reply_opts: ReplyOptions::default(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Handle one inbound message. Never fails: every error is logged here.
    pub async fn process_update(&self, msg: &IncomingMessage) -> DispatchOutcome {
        let user_id = match authorize(msg.sender.as_ref(), &self.allowed) {
            Ok(id) => id,
            Err(rejection) => return DispatchOutcome::Rejected(rejection),
        };

        // Held until the end of this function, across capture and cleanup.
        let mut guard = self.store.acquire().await;

        let Some(session) = guard.get(&user_id) else {
            tracing::error!(user = %user_id, "session does not exist for id");
            return DispatchOutcome::NoSession;
        };

        let text = msg.text.as_deref().unwrap_or("");
        let decision = route(session.status, text, self.status.as_ref());
        tracing::debug!(user = %user_id, action = ?decision.action, "routed update");

        let outcome = match decision.action {
            Action::Reply(reply) => self.reply_text(msg.chat_id, &reply).await,
            Action::Capture => self.capture_and_deliver(msg.chat_id).await,
        };

        if let Some(session) = guard.get_mut(&user_id) {
            session.status = decision.next;
        }
        drop(guard);

        outcome
    }

    async fn reply_text(&self, chat_id: ChatId, text: &str) -> DispatchOutcome {
        match self
            .messenger
            .send_text(chat_id, text, &self.reply_opts)
            .await
        {
            Ok(()) => DispatchOutcome::Replied,
            Err(e) => {
                tracing::error!(chat_id = chat_id.0, "failed to send message: {e}");
                DispatchOutcome::DeliveryFailed(e.to_string())
            }
        }
    }

    async fn capture_and_deliver(&self, chat_id: ChatId) -> DispatchOutcome {
        self.chat_action(chat_id, ChatAction::Typing).await;

        let path = match self.camera.capture(&self.temp_dir, self.image_size).await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(chat_id = chat_id.0, "image capture failed: {e}");
                return DispatchOutcome::CaptureFailed(e.to_string());
            }
        };

        self.chat_action(chat_id, ChatAction::UploadPhoto).await;

        let sent = self
            .messenger
            .send_photo(chat_id, &path, &self.reply_opts)
            .await;

        // Cleanup runs whether or not the send worked and never changes the outcome.
        if let Err(e) = self.camera.discard(&path).await {
            tracing::warn!(path = %path.display(), "failed to delete temp file: {e}");
        }

        match sent {
            Ok(()) => DispatchOutcome::PhotoSent,
            Err(e) => {
                tracing::error!(chat_id = chat_id.0, "failed to send photo: {e}");
                DispatchOutcome::DeliveryFailed(e.to_string())
            }
        }
    }

    /// Presence indicators are advisory; failures only reach the debug log.
    async fn chat_action(&self, chat_id: ChatId, action: ChatAction) {
        if let Err(e) = self.messenger.send_chat_action(chat_id, action).await {
            tracing::debug!(chat_id = chat_id.0, ?action, "chat action failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RawConfig,
        domain::{Sender, UserId},
        errors::Error,
        session::SessionStatus,
        Result,
    };
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    type EventLog = Arc<Mutex<Vec<String>>>;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Sent {
        Text(ChatId, String),
        Photo(ChatId, PathBuf),
        Action(ChatId, ChatAction),
    }

    #[derive(Default)]
    struct FakeMessenger {
        sent: Mutex<Vec<Sent>>,
        fail_text: bool,
        fail_photo: bool,
        fail_actions: bool,
        log: Option<EventLog>,
    }

    impl FakeMessenger {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Text(_, t) => Some(t),
                    _ => None,
                })
                .collect()
        }

        fn photos(&self) -> Vec<PathBuf> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Photo(_, p) => Some(p),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, s: Sent, event: String) {
            self.sent.lock().unwrap().push(s);
            if let Some(log) = &self.log {
                log.lock().unwrap().push(event);
            }
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn send_text(&self, chat_id: ChatId, text: &str, opts: &ReplyOptions) -> Result<()> {
            assert_eq!(opts, &ReplyOptions::default());
            self.record(
                Sent::Text(chat_id, text.to_string()),
                format!("text:{}", chat_id.0),
            );
            if self.fail_text {
                return Err(Error::Delivery("Bad Request: chat not found".to_string()));
            }
            Ok(())
        }

        async fn send_photo(&self, chat_id: ChatId, path: &Path, opts: &ReplyOptions) -> Result<()> {
            assert_eq!(opts, &ReplyOptions::default());
            self.record(
                Sent::Photo(chat_id, path.to_path_buf()),
                format!("photo:{}", chat_id.0),
            );
            if self.fail_photo {
                return Err(Error::Delivery("Request Entity Too Large".to_string()));
            }
            Ok(())
        }

        async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
            let name = match action {
                ChatAction::Typing => "typing",
                ChatAction::UploadPhoto => "upload",
            };
            self.record(Sent::Action(chat_id, action), format!("{name}:{}", chat_id.0));
            if self.fail_actions {
                return Err(Error::Delivery("timeout".to_string()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeCamera {
        fail_capture: bool,
        fail_discard: bool,
        delay: Option<Duration>,
        captures: Mutex<Vec<(PathBuf, ImageSize)>>,
        discards: Mutex<Vec<PathBuf>>,
        next: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        log: Option<EventLog>,
    }

    impl FakeCamera {
        fn push_event(&self, e: &str) {
            if let Some(log) = &self.log {
                log.lock().unwrap().push(e.to_string());
            }
        }
    }

    #[async_trait]
    impl Camera for FakeCamera {
        async fn capture(&self, output_dir: &Path, size: ImageSize) -> Result<PathBuf> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.push_event("capture");
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            self.captures
                .lock()
                .unwrap()
                .push((output_dir.to_path_buf(), size));
            if self.fail_capture {
                self.active.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::Capture("mmal: camera not detected".to_string()));
            }
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            Ok(output_dir.join(format!("capture_{n}.jpg")))
        }

        async fn discard(&self, path: &Path) -> Result<()> {
            self.discards.lock().unwrap().push(path.to_path_buf());
            self.push_event("discard");
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.fail_discard {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only file system",
                )));
            }
            Ok(())
        }
    }

    struct FixedStatus;

    impl StatusProvider for FixedStatus {
        fn uptime(&self) -> String {
            "3d 4h 5m 6s".to_string()
        }

        fn memory_usage(&self) -> String {
            "RSS 8.0 MB (peak 9.5 MB)".to_string()
        }
    }

    fn config() -> Config {
        Config::from_raw(RawConfig {
            api_token: "123:abc".to_string(),
            available_ids: vec!["alice".to_string(), "bob".to_string()],
            image_width: 100,
            image_height: 100,
            temp_dir: Some(PathBuf::from("/tmp/rpicam-test")),
            ..RawConfig::default()
        })
        .unwrap()
    }

    fn dispatcher(messenger: Arc<FakeMessenger>, camera: Arc<FakeCamera>) -> Dispatcher {
        Dispatcher::new(&config(), messenger, camera, Arc::new(FixedStatus))
    }

    fn msg(chat: i64, username: Option<&str>, text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: ChatId(chat),
            sender: Some(Sender {
                username: username.map(|s| s.to_string()),
                first_name: "Tester".to_string(),
            }),
            text: Some(text.to_string()),
        }
    }

    #[tokio::test]
    async fn unauthorized_senders_get_nothing() {
        let messenger = Arc::new(FakeMessenger::default());
        let camera = Arc::new(FakeCamera::default());
        let d = dispatcher(messenger.clone(), camera.clone());

        let out = d.process_update(&msg(1, Some("mallory"), "/capture")).await;
        assert_eq!(
            out,
            DispatchOutcome::Rejected(AuthRejection::NotAllowed {
                username: "mallory".to_string()
            })
        );
        assert!(!out.is_success());

        let out = d.process_update(&msg(1, None, "/status")).await;
        assert!(matches!(
            out,
            DispatchOutcome::Rejected(AuthRejection::MissingUsername { .. })
        ));

        let mut no_sender = msg(1, None, "/help");
        no_sender.sender = None;
        assert!(matches!(
            d.process_update(&no_sender).await,
            DispatchOutcome::Rejected(_)
        ));

        assert!(messenger.sent().is_empty());
        assert!(camera.captures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sessions_exist_up_front_and_stay_waiting() {
        let messenger = Arc::new(FakeMessenger::default());
        let camera = Arc::new(FakeCamera::default());
        let d = dispatcher(messenger, camera);

        for name in ["alice", "bob"] {
            let s = d.store().snapshot(&UserId::from(name)).await.unwrap();
            assert_eq!(s.status, SessionStatus::Waiting);
        }

        for text in ["/start", "/capture", "/status", "/help", "hello"] {
            d.process_update(&msg(7, Some("alice"), text)).await;
            let s = d.store().snapshot(&UserId::from("alice")).await.unwrap();
            assert_eq!(s.status, SessionStatus::Waiting);
        }
    }

    #[tokio::test]
    async fn status_reply_uses_introspection_verbatim() {
        let messenger = Arc::new(FakeMessenger::default());
        let d = dispatcher(messenger.clone(), Arc::new(FakeCamera::default()));

        let out = d.process_update(&msg(5, Some("bob"), "/status")).await;
        assert_eq!(out, DispatchOutcome::Replied);
        assert_eq!(
            messenger.sent(),
            vec![Sent::Text(
                ChatId(5),
                "Uptime: 3d 4h 5m 6s\nMemory Usage: RSS 8.0 MB (peak 9.5 MB)".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn unknown_command_is_echoed() {
        let messenger = Arc::new(FakeMessenger::default());
        let d = dispatcher(messenger.clone(), Arc::new(FakeCamera::default()));

        d.process_update(&msg(5, Some("bob"), " /unknowncmd ")).await;
        assert_eq!(
            messenger.texts(),
            vec!["*/unknowncmd*: Unknown command".to_string()]
        );
    }

    #[tokio::test]
    async fn non_text_message_falls_back_to_unknown() {
        let messenger = Arc::new(FakeMessenger::default());
        let d = dispatcher(messenger.clone(), Arc::new(FakeCamera::default()));

        let mut sticker = msg(5, Some("bob"), "");
        sticker.text = None;
        assert_eq!(d.process_update(&sticker).await, DispatchOutcome::Replied);
        assert_eq!(messenger.texts(), vec!["**: Unknown command".to_string()]);
    }

    #[tokio::test]
    async fn text_delivery_failure_is_reported_not_retried() {
        let messenger = Arc::new(FakeMessenger {
            fail_text: true,
            ..FakeMessenger::default()
        });
        let d = dispatcher(messenger.clone(), Arc::new(FakeCamera::default()));

        let out = d.process_update(&msg(5, Some("bob"), "/start")).await;
        assert!(matches!(out, DispatchOutcome::DeliveryFailed(ref s) if s.contains("chat not found")));
        assert_eq!(messenger.texts().len(), 1);

        // The next update is still served.
        let out = d.process_update(&msg(5, Some("alice"), "/help")).await;
        assert!(matches!(out, DispatchOutcome::DeliveryFailed(_)));
        assert_eq!(messenger.texts().len(), 2);
    }

    #[tokio::test]
    async fn capture_sends_photo_then_deletes_it_once() {
        let messenger = Arc::new(FakeMessenger::default());
        let camera = Arc::new(FakeCamera::default());
        let d = dispatcher(messenger.clone(), camera.clone());

        let out = d.process_update(&msg(9, Some("alice"), "/capture")).await;
        assert_eq!(out, DispatchOutcome::PhotoSent);
        assert!(out.is_success());

        let path = PathBuf::from("/tmp/rpicam-test/capture_0.jpg");
        assert_eq!(
            messenger.sent(),
            vec![
                Sent::Action(ChatId(9), ChatAction::Typing),
                Sent::Action(ChatId(9), ChatAction::UploadPhoto),
                Sent::Photo(ChatId(9), path.clone()),
            ]
        );
        assert_eq!(*camera.discards.lock().unwrap(), vec![path]);
    }

    #[tokio::test]
    async fn failed_photo_send_still_deletes_the_file() {
        let messenger = Arc::new(FakeMessenger {
            fail_photo: true,
            ..FakeMessenger::default()
        });
        let camera = Arc::new(FakeCamera::default());
        let d = dispatcher(messenger.clone(), camera.clone());

        let out = d.process_update(&msg(9, Some("alice"), "/capture")).await;
        assert!(matches!(out, DispatchOutcome::DeliveryFailed(_)));
        assert_eq!(messenger.photos().len(), 1);
        assert_eq!(camera.discards.lock().unwrap().len(), 1);
        assert_eq!(camera.discards.lock().unwrap()[0], messenger.photos()[0]);
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_change_outcome() {
        let messenger = Arc::new(FakeMessenger::default());
        let camera = Arc::new(FakeCamera {
            fail_discard: true,
            ..FakeCamera::default()
        });
        let d = dispatcher(messenger.clone(), camera.clone());

        let out = d.process_update(&msg(9, Some("alice"), "/capture")).await;
        assert_eq!(out, DispatchOutcome::PhotoSent);
        assert_eq!(camera.discards.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn capture_failure_is_silent_to_the_user() {
        let messenger = Arc::new(FakeMessenger::default());
        let camera = Arc::new(FakeCamera {
            fail_capture: true,
            ..FakeCamera::default()
        });
        let d = dispatcher(messenger.clone(), camera.clone());

        let out = d.process_update(&msg(9, Some("alice"), "/capture")).await;
        assert!(matches!(out, DispatchOutcome::CaptureFailed(ref s) if s.contains("camera not detected")));
        assert!(messenger.texts().is_empty());
        assert!(messenger.photos().is_empty());
        assert!(camera.discards.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn capture_failure_logs_exactly_one_error() {
        let logs = crate::logging::LogBuffer::default();
        let _guard = tracing::subscriber::set_default(logs.subscriber());

        let messenger = Arc::new(FakeMessenger::default());
        let camera = Arc::new(FakeCamera {
            fail_capture: true,
            ..FakeCamera::default()
        });
        let d = dispatcher(messenger, camera);

        let out = d.process_update(&msg(9, Some("alice"), "/capture")).await;
        assert!(matches!(out, DispatchOutcome::CaptureFailed(_)));

        let errors = logs.lines_at("ERROR");
        assert_eq!(errors.len(), 1, "{errors:?}");
        assert!(errors[0].contains("image capture failed"));
        assert!(errors[0].contains("camera not detected"));
        assert!(logs.lines_at("WARN").is_empty());
    }

    #[tokio::test]
    async fn chat_action_failures_are_ignored() {
        let messenger = Arc::new(FakeMessenger {
            fail_actions: true,
            ..FakeMessenger::default()
        });
        let d = dispatcher(messenger.clone(), Arc::new(FakeCamera::default()));

        let out = d.process_update(&msg(9, Some("alice"), "/capture")).await;
        assert_eq!(out, DispatchOutcome::PhotoSent);
    }

    #[tokio::test]
    async fn image_size_is_clamped_for_every_capture() {
        let camera = Arc::new(FakeCamera::default());
        let d = dispatcher(Arc::new(FakeMessenger::default()), camera.clone());

        for _ in 0..3 {
            d.process_update(&msg(9, Some("bob"), "/capture")).await;
        }

        let captures = camera.captures.lock().unwrap().clone();
        assert_eq!(captures.len(), 3);
        for (dir, size) in captures {
            assert_eq!(dir, PathBuf::from("/tmp/rpicam-test"));
            assert_eq!(
                size,
                ImageSize {
                    width: 400,
                    height: 300
                }
            );
        }
    }

    #[tokio::test]
    async fn allowed_id_without_session_is_dropped() {
        let messenger = Arc::new(FakeMessenger::default());
        let cfg = config();
        let store = SessionStore::from_allow_list(&AllowList::new([UserId::from("alice")]));
        let d = Dispatcher::with_store(
            &cfg,
            store,
            messenger.clone(),
            Arc::new(FakeCamera::default()),
            Arc::new(FixedStatus),
        );

        let out = d.process_update(&msg(3, Some("bob"), "/start")).await;
        assert_eq!(out, DispatchOutcome::NoSession);
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_updates_never_overlap() {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let messenger = Arc::new(FakeMessenger {
            log: Some(log.clone()),
            ..FakeMessenger::default()
        });
        let camera = Arc::new(FakeCamera {
            delay: Some(Duration::from_millis(50)),
            log: Some(log.clone()),
            ..FakeCamera::default()
        });
        let d = Arc::new(dispatcher(messenger, camera.clone()));

        let (d1, d2) = (d.clone(), d.clone());
        let a = tokio::spawn(async move { d1.process_update(&msg(1, Some("alice"), "/capture")).await });
        let b = tokio::spawn(async move { d2.process_update(&msg(2, Some("bob"), "/capture")).await });
        assert_eq!(a.await.unwrap(), DispatchOutcome::PhotoSent);
        assert_eq!(b.await.unwrap(), DispatchOutcome::PhotoSent);

        assert_eq!(camera.max_active.load(Ordering::SeqCst), 1);

        let section = |chat: i64| -> Vec<String> {
            vec![
                format!("typing:{chat}"),
                "capture".to_string(),
                format!("upload:{chat}"),
                format!("photo:{chat}"),
                "discard".to_string(),
            ]
        };
        let events = log.lock().unwrap().clone();
        let alice_first = [section(1), section(2)].concat();
        let bob_first = [section(2), section(1)].concat();
        assert!(
            events == alice_first || events == bob_first,
            "interleaved: {events:?}"
        );
    }
}

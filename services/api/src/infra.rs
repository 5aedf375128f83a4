use casework::config::EngineConfig;
use casework::workflows::case_study::{
    BlobError, BlobStorage, CaseStudyService, InMemoryCaseStudyStore, LegalArea, Notification,
    NotificationError, NotificationSink, Role, User,
};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

pub(crate) type EngineService =
    CaseStudyService<InMemoryCaseStudyStore, LoggingNotificationSink, InMemoryBlobStorage>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Logs every notification and keeps a copy for the demo transcript.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationSink {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationSink for LoggingNotificationSink {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(
            recipient = %notification.user_id,
            kind = ?notification.kind,
            title = %notification.title,
            "notification dispatched"
        );
        self.sent
            .lock()
            .map_err(|_| NotificationError::Transport("notification log poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}

impl LoggingNotificationSink {
    pub(crate) fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryBlobStorage {
    next: Arc<AtomicUsize>,
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl BlobStorage for InMemoryBlobStorage {
    fn upload(&self, bytes: &[u8], content_type: &str) -> Result<String, BlobError> {
        let extension = mime_guess::get_mime_extensions_str(content_type)
            .and_then(|extensions| extensions.first())
            .copied()
            .unwrap_or("bin");
        let sequence = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let url = format!("memory://blobs/{sequence:06}.{extension}");

        self.blobs
            .lock()
            .map_err(|_| BlobError::Unavailable("blob map poisoned".to_string()))?
            .insert(url.clone(), bytes.to_vec());
        Ok(url)
    }
}

impl InMemoryBlobStorage {
    pub(crate) fn len(&self) -> usize {
        self.blobs.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

/// Roster used by `serve` and `demo` until a real user directory is wired in.
pub(crate) fn seed_users() -> Vec<User> {
    vec![
        User::student("stu-lena", 3),
        User::student("stu-jonas", 1),
        User::teaching("ins-mueller", Role::Instructor, LegalArea::CivilLaw),
        User::teaching("ins-schmidt", Role::Instructor, LegalArea::CivilLaw),
        User::teaching("spr-wagner", Role::Springer, LegalArea::CivilLaw),
        User::teaching("ins-becker", Role::Instructor, LegalArea::CriminalLaw),
        User::teaching("spr-hoffmann", Role::Springer, LegalArea::CriminalLaw),
        User::teaching("ins-koch", Role::Instructor, LegalArea::PublicLaw),
        User::admin("adm-office"),
    ]
}

pub(crate) struct Engine {
    pub(crate) service: Arc<EngineService>,
    pub(crate) notifications: LoggingNotificationSink,
    pub(crate) blobs: InMemoryBlobStorage,
}

pub(crate) fn build_engine(config: EngineConfig, users: Vec<User>) -> Engine {
    let notifications = LoggingNotificationSink::default();
    let blobs = InMemoryBlobStorage::default();
    let service = Arc::new(CaseStudyService::new(
        Arc::new(InMemoryCaseStudyStore::with_users(users)),
        Arc::new(notifications.clone()),
        Arc::new(blobs.clone()),
        config,
    ));
    Engine {
        service,
        notifications,
        blobs,
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

//! RFID tag registration and lookup.

use std::sync::Arc;

use async_trait::async_trait;
use common::StudentId;
use store::{CanteenStore, RfidMapping, Student};
use tracing::info;

use crate::error::{DomainError, Result};
use crate::otp::{OtpSender, OtpStore};

/// Resolves a physical tag to the student it belongs to.
#[async_trait]
pub trait RfidLookup: Send + Sync {
    async fn student_for_tag(&self, tag_id: &str) -> Result<Option<StudentId>>;
}

/// Registers tags against students and answers tag lookups.
///
/// Self-service registration is gated by a one-time code sent to the
/// student's e-mail address.
pub struct RfidRegistry<S: CanteenStore> {
    store: S,
    otp: Arc<OtpStore>,
    sender: Arc<dyn OtpSender>,
}

impl<S: CanteenStore> RfidRegistry<S> {
    pub fn new(store: S, otp: Arc<OtpStore>, sender: Arc<dyn OtpSender>) -> Self {
        Self { store, otp, sender }
    }

    pub fn otp_store(&self) -> &OtpStore {
        &self.otp
    }

    /// Issues a registration code and hands it to the sender.
    #[tracing::instrument(skip(self))]
    pub async fn request_otp(&self, student_id: StudentId) -> Result<()> {
        let student = self.student(student_id).await?;
        self.otp.sweep();
        let code = self.otp.issue(&student.email);
        self.sender.send(&student.email, &code).await
    }

    /// Registers `tag_id` for the student after checking their code.
    #[tracing::instrument(skip(self, otp))]
    pub async fn register_with_otp(
        &self,
        student_id: StudentId,
        tag_id: &str,
        otp: &str,
    ) -> Result<RfidMapping> {
        let tag_id = validate_tag(tag_id)?;
        let student = self.student(student_id).await?;
        if !self.otp.validate(&student.email, otp) {
            return Err(DomainError::bad_input("invalid OTP"));
        }
        self.save(RfidMapping::new(tag_id, student_id)).await
    }

    /// Registers `tag_id` for a student without a code.
    #[tracing::instrument(skip(self))]
    pub async fn register(&self, student_id: StudentId, tag_id: &str) -> Result<RfidMapping> {
        let tag_id = validate_tag(tag_id)?;
        self.student(student_id).await?;
        self.save(RfidMapping::new(tag_id, student_id)).await
    }

    pub async fn get(&self, tag_id: &str) -> Result<RfidMapping> {
        self.store
            .get_rfid_mapping(tag_id)
            .await?
            .ok_or_else(|| DomainError::not_found("rfid mapping", tag_id))
    }

    async fn save(&self, mapping: RfidMapping) -> Result<RfidMapping> {
        self.store.upsert_rfid_mapping(&mapping).await?;
        info!(tag_id = %mapping.tag_id, student_id = %mapping.student_id, "RFID tag registered");
        Ok(mapping)
    }

    async fn student(&self, id: StudentId) -> Result<Student> {
        self.store
            .get_student(id)
            .await?
            .ok_or_else(|| DomainError::not_found("student", id))
    }
}

#[async_trait]
impl<S: CanteenStore> RfidLookup for RfidRegistry<S> {
    async fn student_for_tag(&self, tag_id: &str) -> Result<Option<StudentId>> {
        Ok(self
            .store
            .get_rfid_mapping(tag_id)
            .await?
            .map(|mapping| mapping.student_id))
    }
}

fn validate_tag(tag_id: &str) -> Result<&str> {
    let tag_id = tag_id.trim();
    if tag_id.is_empty() {
        return Err(DomainError::bad_input("tag id must not be empty"));
    }
    Ok(tag_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use store::InMemoryStore;

    #[derive(Default)]
    struct CapturingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl OtpSender for CapturingSender {
        async fn send(&self, recipient: &str, code: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), code.to_string()));
            Ok(())
        }
    }

    async fn setup() -> (RfidRegistry<InMemoryStore>, Arc<CapturingSender>, Student) {
        let store = InMemoryStore::new();
        let student = Student::new("Ada", "ada@example.com");
        store.insert_student(&student).await.unwrap();
        let sender = Arc::new(CapturingSender::default());
        let registry = RfidRegistry::new(store, Arc::new(OtpStore::default()), sender.clone());
        (registry, sender, student)
    }

    #[tokio::test]
    async fn test_register_with_sent_code() {
        let (registry, sender, student) = setup().await;
        registry.request_otp(student.id).await.unwrap();
        let (recipient, code) = sender.sent.lock().unwrap()[0].clone();
        assert_eq!(recipient, "ada@example.com");

        let mapping = registry
            .register_with_otp(student.id, "TAG-1", &code)
            .await
            .unwrap();
        assert_eq!(mapping.student_id, student.id);
        assert_eq!(
            registry.student_for_tag("TAG-1").await.unwrap(),
            Some(student.id)
        );
    }

    #[tokio::test]
    async fn test_wrong_code_rejected() {
        let (registry, _, student) = setup().await;
        registry.request_otp(student.id).await.unwrap();

        let err = registry
            .register_with_otp(student.id, "TAG-1", "not-a-code")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::BadInput(ref m) if m == "invalid OTP"));
        assert!(registry.get("TAG-1").await.is_err());
    }

    #[tokio::test]
    async fn test_reregistration_overwrites() {
        let (registry, _, student) = setup().await;
        let other = Student::new("Grace", "grace@example.com");
        registry.store.insert_student(&other).await.unwrap();

        registry.register(student.id, "TAG-1").await.unwrap();
        registry.register(other.id, "TAG-1").await.unwrap();

        assert_eq!(registry.get("TAG-1").await.unwrap().student_id, other.id);
    }

    #[tokio::test]
    async fn test_admin_register_requires_student() {
        let (registry, _, _) = setup().await;
        let err = registry.register(StudentId::new(), "TAG-9").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "student", .. }));
    }

    #[tokio::test]
    async fn test_unknown_tag() {
        let (registry, _, _) = setup().await;
        assert_eq!(registry.student_for_tag("nope").await.unwrap(), None);
        assert!(matches!(
            registry.get("nope").await,
            Err(DomainError::NotFound { .. })
        ));
    }
}

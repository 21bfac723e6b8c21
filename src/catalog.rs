//! Closed catalog of platform events and typed builders for emitting them.
//!
//! Domain collaborators (user management, assignment scheduling, compliance
//! calculation, quiz grading) never touch the wire format directly: they call
//! one builder per catalog entry with a strongly typed payload, and the
//! builder produces the opaque JSON document that goes out on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Event type catalog
// ---------------------------------------------------------------------------

/// Closed set of event types a subscription may register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEventType {
    UserCreated,
    UserUpdated,
    UserDeleted,
    AssignmentCreated,
    AssignmentUpdated,
    AssignmentDueSoon,
    AssignmentOverdue,
    TrainingStarted,
    TrainingProgress,
    TrainingCompleted,
    QuizSubmitted,
    QuizPassed,
    QuizFailed,
    LessonCompleted,
    EsignatureCaptured,
    DocumentExpiring,
    DocumentExpired,
    ComplianceAtRisk,
    ComplianceExpired,
    BtwSessionCompleted,
}

impl WebhookEventType {
    /// Wire representation, used in subscriptions, payloads, and the
    /// `X-Webhook-Event` header.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserCreated => "user.created",
            Self::UserUpdated => "user.updated",
            Self::UserDeleted => "user.deleted",
            Self::AssignmentCreated => "assignment.created",
            Self::AssignmentUpdated => "assignment.updated",
            Self::AssignmentDueSoon => "assignment.due_soon",
            Self::AssignmentOverdue => "assignment.overdue",
            Self::TrainingStarted => "training.started",
            Self::TrainingProgress => "training.progress",
            Self::TrainingCompleted => "training.completed",
            Self::QuizSubmitted => "quiz.submitted",
            Self::QuizPassed => "quiz.passed",
            Self::QuizFailed => "quiz.failed",
            Self::LessonCompleted => "lesson.completed",
            Self::EsignatureCaptured => "esignature.captured",
            Self::DocumentExpiring => "document.expiring",
            Self::DocumentExpired => "document.expired",
            Self::ComplianceAtRisk => "compliance.at_risk",
            Self::ComplianceExpired => "compliance.expired",
            Self::BtwSessionCompleted => "btw_session.completed",
        }
    }

    /// Parse a wire string back into an event type. Returns `None` for
    /// anything outside the closed catalog.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|et| et.as_str() == s)
    }

    /// The event category (the part before the dot).
    #[must_use]
    pub fn category(&self) -> &'static str {
        self.as_str().split('.').next().unwrap_or_default()
    }

    /// Human-readable description for admin tooling.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::UserCreated => "A user account was created",
            Self::UserUpdated => "A user account was updated",
            Self::UserDeleted => "A user account was deleted",
            Self::AssignmentCreated => "A training assignment was created",
            Self::AssignmentUpdated => "A training assignment was updated",
            Self::AssignmentDueSoon => "A training assignment is approaching its due date",
            Self::AssignmentOverdue => "A training assignment is past its due date",
            Self::TrainingStarted => "A trainee started a course",
            Self::TrainingProgress => "A trainee's course progress changed",
            Self::TrainingCompleted => "A trainee completed a course",
            Self::QuizSubmitted => "A quiz was submitted for grading",
            Self::QuizPassed => "A quiz was graded as passed",
            Self::QuizFailed => "A quiz was graded as failed",
            Self::LessonCompleted => "A lesson within a course was completed",
            Self::EsignatureCaptured => "An electronic signature was captured",
            Self::DocumentExpiring => "A compliance document is about to expire",
            Self::DocumentExpired => "A compliance document has expired",
            Self::ComplianceAtRisk => "A user's compliance status is at risk",
            Self::ComplianceExpired => "A user's compliance status has expired",
            Self::BtwSessionCompleted => "A behind-the-wheel session was completed",
        }
    }

    /// All event types in the catalog.
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![
            Self::UserCreated,
            Self::UserUpdated,
            Self::UserDeleted,
            Self::AssignmentCreated,
            Self::AssignmentUpdated,
            Self::AssignmentDueSoon,
            Self::AssignmentOverdue,
            Self::TrainingStarted,
            Self::TrainingProgress,
            Self::TrainingCompleted,
            Self::QuizSubmitted,
            Self::QuizPassed,
            Self::QuizFailed,
            Self::LessonCompleted,
            Self::EsignatureCaptured,
            Self::DocumentExpiring,
            Self::DocumentExpired,
            Self::ComplianceAtRisk,
            Self::ComplianceExpired,
            Self::BtwSessionCompleted,
        ]
    }
}

impl std::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Typed payloads
// ---------------------------------------------------------------------------

/// Payload for `user.*` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPayload {
    pub user_id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Payload for `assignment.*` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentPayload {
    pub assignment_id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
}

/// Payload for `training.*` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingPayload {
    pub enrollment_id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Payload for `quiz.*` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizPayload {
    pub quiz_id: Uuid,
    pub user_id: Uuid,
    pub score_percent: i32,
    pub passing_score_percent: i32,
    pub attempt: i32,
}

/// Payload for `lesson.completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonPayload {
    pub lesson_id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
}

/// Payload for `esignature.captured`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsignaturePayload {
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub signed_at: DateTime<Utc>,
}

/// Payload for `document.*` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPayload {
    pub document_id: Uuid,
    pub name: String,
    pub expires_at: DateTime<Utc>,
}

/// Payload for `compliance.*` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompliancePayload {
    pub user_id: Uuid,
    pub requirement_id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Payload for `btw_session.completed` (behind-the-wheel driving session).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BtwSessionPayload {
    pub session_id: Uuid,
    pub driver_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructor_id: Option<Uuid>,
    pub duration_minutes: i32,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// An immutable domain fact consumed by the dispatcher.
///
/// Events are ephemeral: only the delivery records derived from them are
/// persisted. `event_id` exists for log correlation across the fan-out.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event_id: Uuid,
    pub event_type: WebhookEventType,
    pub tenant_id: Uuid,
    pub subject_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
    pub data: Value,
}

impl WebhookEvent {
    fn build<T: Serialize>(
        event_type: WebhookEventType,
        tenant_id: Uuid,
        subject_id: Option<Uuid>,
        payload: &T,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            tenant_id,
            subject_id,
            occurred_at: Utc::now(),
            // Plain payload structs serialize infallibly
            data: serde_json::to_value(payload).unwrap_or_default(),
        }
    }

    pub fn user_created(tenant_id: Uuid, p: &UserPayload) -> Self {
        Self::build(WebhookEventType::UserCreated, tenant_id, Some(p.user_id), p)
    }

    pub fn user_updated(tenant_id: Uuid, p: &UserPayload) -> Self {
        Self::build(WebhookEventType::UserUpdated, tenant_id, Some(p.user_id), p)
    }

    pub fn user_deleted(tenant_id: Uuid, p: &UserPayload) -> Self {
        Self::build(WebhookEventType::UserDeleted, tenant_id, Some(p.user_id), p)
    }

    pub fn assignment_created(tenant_id: Uuid, p: &AssignmentPayload) -> Self {
        Self::build(
            WebhookEventType::AssignmentCreated,
            tenant_id,
            Some(p.user_id),
            p,
        )
    }

    pub fn assignment_updated(tenant_id: Uuid, p: &AssignmentPayload) -> Self {
        Self::build(
            WebhookEventType::AssignmentUpdated,
            tenant_id,
            Some(p.user_id),
            p,
        )
    }

    pub fn assignment_due_soon(tenant_id: Uuid, p: &AssignmentPayload) -> Self {
        Self::build(
            WebhookEventType::AssignmentDueSoon,
            tenant_id,
            Some(p.user_id),
            p,
        )
    }

    pub fn assignment_overdue(tenant_id: Uuid, p: &AssignmentPayload) -> Self {
        Self::build(
            WebhookEventType::AssignmentOverdue,
            tenant_id,
            Some(p.user_id),
            p,
        )
    }

    pub fn training_started(tenant_id: Uuid, p: &TrainingPayload) -> Self {
        Self::build(
            WebhookEventType::TrainingStarted,
            tenant_id,
            Some(p.user_id),
            p,
        )
    }

    pub fn training_progress(tenant_id: Uuid, p: &TrainingPayload) -> Self {
        Self::build(
            WebhookEventType::TrainingProgress,
            tenant_id,
            Some(p.user_id),
            p,
        )
    }

    pub fn training_completed(tenant_id: Uuid, p: &TrainingPayload) -> Self {
        Self::build(
            WebhookEventType::TrainingCompleted,
            tenant_id,
            Some(p.user_id),
            p,
        )
    }

    pub fn quiz_submitted(tenant_id: Uuid, p: &QuizPayload) -> Self {
        Self::build(WebhookEventType::QuizSubmitted, tenant_id, Some(p.user_id), p)
    }

    pub fn quiz_passed(tenant_id: Uuid, p: &QuizPayload) -> Self {
        Self::build(WebhookEventType::QuizPassed, tenant_id, Some(p.user_id), p)
    }

    pub fn quiz_failed(tenant_id: Uuid, p: &QuizPayload) -> Self {
        Self::build(WebhookEventType::QuizFailed, tenant_id, Some(p.user_id), p)
    }

    pub fn lesson_completed(tenant_id: Uuid, p: &LessonPayload) -> Self {
        Self::build(
            WebhookEventType::LessonCompleted,
            tenant_id,
            Some(p.user_id),
            p,
        )
    }

    pub fn esignature_captured(tenant_id: Uuid, p: &EsignaturePayload) -> Self {
        Self::build(
            WebhookEventType::EsignatureCaptured,
            tenant_id,
            Some(p.user_id),
            p,
        )
    }

    pub fn document_expiring(tenant_id: Uuid, p: &DocumentPayload) -> Self {
        Self::build(
            WebhookEventType::DocumentExpiring,
            tenant_id,
            Some(p.document_id),
            p,
        )
    }

    pub fn document_expired(tenant_id: Uuid, p: &DocumentPayload) -> Self {
        Self::build(
            WebhookEventType::DocumentExpired,
            tenant_id,
            Some(p.document_id),
            p,
        )
    }

    pub fn compliance_at_risk(tenant_id: Uuid, p: &CompliancePayload) -> Self {
        Self::build(
            WebhookEventType::ComplianceAtRisk,
            tenant_id,
            Some(p.user_id),
            p,
        )
    }

    pub fn compliance_expired(tenant_id: Uuid, p: &CompliancePayload) -> Self {
        Self::build(
            WebhookEventType::ComplianceExpired,
            tenant_id,
            Some(p.user_id),
            p,
        )
    }

    pub fn btw_session_completed(tenant_id: Uuid, p: &BtwSessionPayload) -> Self {
        Self::build(
            WebhookEventType::BtwSessionCompleted,
            tenant_id,
            Some(p.driver_id),
            p,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

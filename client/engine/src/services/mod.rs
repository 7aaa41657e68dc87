pub mod assignment_service;
pub mod exam_service;
pub mod history_service;
pub mod subscription_service;

pub use assignment_service::AssignmentService;
pub use exam_service::{ExamService, ReviewEntry};
pub use history_service::{AutoConfirm, ConfirmGate, HistoryService};
pub use subscription_service::{SnapshotEvent, SubscriptionManager, SubscriptionScope};

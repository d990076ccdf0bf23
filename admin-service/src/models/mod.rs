pub mod admin_user;
pub mod audit_log;
pub mod invoice;
pub mod jit_request;
pub mod lead;
pub mod proposal;
pub mod role;
pub mod role_assignment;
pub mod session;
pub mod soft_delete;
pub mod tenant;
pub mod user;

pub use admin_user::{AdminUser, AdminUserResponse};
pub use audit_log::{AuditActor, AuditEntry, AuditLog};
pub use invoice::{Invoice, InvoiceItem, InvoiceStatus, InvoiceWithItems, NewInvoice, NewInvoiceItem};
pub use jit_request::{JitAccessRequest, JitStatus};
pub use lead::{Lead, LeadStatus};
pub use proposal::{
    NewProposalItem, Proposal, ProposalChanges, ProposalItem, ProposalStatus, ProposalWithItems,
};
pub use role::{Permission, PermissionSet, Role, RoleResponse};
pub use role_assignment::RoleAssignment;
pub use session::{RevokeReason, Session, SessionInvalid, SessionResponse};
pub use soft_delete::SoftDelete;
pub use tenant::Tenant;
pub use user::{PasswordHistoryEntry, User, UserResponse};

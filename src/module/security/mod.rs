//! Security checks for module files
//!
//! File permission enforcement, detached HMAC signatures, and a static
//! risk-pattern scan, combined by the [`SecurityGate`].

pub mod content;
pub mod gate;
pub mod permissions;
pub mod signature;

pub use content::ContentScanner;
pub use gate::{GateDecision, GatePolicy, SecurityGate};
pub use permissions::{restrict_mode, PermissionChecker, OWNER_READ_WRITE};
pub use signature::{SignatureStatus, SigningKey};

//! Accessibility-view builder.
//!
//! Turns raw `Accessibility.getFullAXTree` + pierced `DOM.getDocument`
//! snapshots into the normalized outline, the encoded-id → XPath map and the
//! encoded-id → URL map that the rest of the control plane acts on.

pub mod builder;
pub mod dom;
pub mod errors;
pub mod model;
pub mod outline;
pub mod ports;

pub use builder::{assemble_view, build_view, fetch_snapshot, RawSnapshot};
pub use dom::{DomEntry, DomIndex};
pub use errors::AxViewError;
pub use model::{AxNode, AxView};
pub use ports::{FrameAxSnapshot, FrameDomSnapshot, PerceptionPort};

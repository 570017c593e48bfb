//! # Workstation Types Library
//!
//! Plain data types shared by every crate of the workstation.
//!
//! ## Design Philosophy
//!
//! - **Explicit Units**: A [`Pose`] is always stored in protocol units
//!   (meters/radians); conversion to millimeters/degrees is a pure function.
//! - **Typed Records**: Product rows are a [`ProductRecord`] with named fields
//!   and an ordered [`ProductField`] code table, never an open-ended map.
//! - **Clear Boundaries**: No I/O lives here. Codecs belong in `codec`, sockets
//!   in `network`.
//!
//! ## Integration Points
//!
//! ```text
//! libs/types → codec/ (Pose decoding) → network/ (ActivityEvent log)
//!     ↑                                      ↓
//! Pure Data                           services/ (reply formatting)
//! ```

pub mod activity;
pub mod pose;
pub mod product;

pub use activity::{ActivityEvent, EventKind};
pub use pose::{Pose, METERS_TO_MILLIMETERS, RADIANS_TO_DEGREES};
pub use product::{
    field_code, format_reply, normalize_identifier, ProductField, ProductRecord, NOT_FOUND_REPLY,
};

//! Camera-side data: captured frames and the intrinsics derived from their resolution.

pub mod frame;
pub mod intrinsics;

pub use frame::{Frame, FrameSeq};
pub use intrinsics::{CameraIntrinsics, DISTORTION_LEN};

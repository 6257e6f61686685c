//! Platforms without kernel copy primitives; every transfer takes the
//! buffered path.

use crate::KernelCopy;

#[derive(Debug, Clone, Copy, Default)]
pub struct Platform;

impl KernelCopy for Platform {
    fn name(&self) -> &'static str {
        std::env::consts::OS
    }
}

//! Static device properties of an open backend file.

use crate::DeviceCharacteristics;

/// Static properties of the medium behind one open file.
///
/// Both values are queried once per connection and must not change while
/// the handle is open.
pub trait FileDevice: Send + Sync {
    /// Minimum write, in bytes, that can be performed without disturbing
    /// other bytes of the file.
    fn sector_size(&self) -> u32;

    /// Behaviours of the medium the engine may rely on.
    ///
    /// Advertising a flag the backend does not honour lets the engine skip
    /// safety measures and can silently corrupt data.
    fn device_characteristics(&self) -> DeviceCharacteristics;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_device_is_object_safe() {
        fn _check(_: &dyn FileDevice) {}
    }
}

/// Which compute device a generation context is created on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceMap {
    ForceCpu,
    Ordinal(usize),
}

impl DeviceMap {
    pub fn new(cpu: bool, ordinal: usize) -> Self {
        if cpu {
            Self::ForceCpu
        } else {
            Self::Ordinal(ordinal)
        }
    }
}

impl Default for DeviceMap {
    fn default() -> Self {
        Self::Ordinal(0)
    }
}

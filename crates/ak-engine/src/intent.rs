//! Channel grouping tags.

/// Opaque tag grouping channels for bulk volume control.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Intent(pub u8);

impl Intent {
    pub const OTHER: Intent = Intent(0);
    pub const SFX: Intent = Intent(1);
    pub const BGM: Intent = Intent(2);
    pub const FOLEY: Intent = Intent(3);
    pub const UI: Intent = Intent(4);
    pub const VOICE: Intent = Intent(5);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Number of distinct intents.
pub const INTENT_COUNT: usize = 256;

/// Per-intent trim meaning "leave untouched".
pub const INTENT_TRIM_UNITY: u8 = 0xff;

use pops_model::{Priority, Slot};

/// Bytes per record.
pub const RECORD_WIDTH: usize = 100;
/// Bytes of the originator label.
pub const LABEL_WIDTH: usize = 5;
/// Bytes of the text payload.
pub const TEXT_WIDTH: usize = 80;

const LABEL_OFFSET: usize = 12;
const TEXT_OFFSET: usize = 20;

/// One fixed-width entry of the message store.
///
/// The tag packs the writer's slot number in its low byte and the priority
/// above it: `tag = slot + 256 * priority`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub tag: i32,
    pub label: String,
    pub text: String,
}

impl MessageRecord {
    pub fn new(slot: Slot, priority: Priority, label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag: pack_tag(slot, priority),
            label: label.into(),
            text: text.into(),
        }
    }

    pub fn slot_number(&self) -> u32 {
        self.tag.max(0) as u32 % 256
    }

    pub fn priority(&self) -> Priority {
        Priority(self.tag.max(0) as u32 / 256)
    }

    pub fn belongs_to(&self, slot: Slot) -> bool {
        self.slot_number() == slot.number()
    }

    /// `label` padded to five columns, slot glyph, `": "`, text.
    pub fn format(&self, slot: Slot) -> String {
        format!(
            "{:<width$}{}: {}",
            self.label,
            slot.glyph(),
            self.text,
            width = LABEL_WIDTH
        )
    }

    /// Label and text longer than their fields are cut.
    pub fn to_bytes(&self) -> [u8; RECORD_WIDTH] {
        let mut out = [0u8; RECORD_WIDTH];
        out[..4].copy_from_slice(&self.tag.to_ne_bytes());
        put_padded(&mut out[LABEL_OFFSET..LABEL_OFFSET + LABEL_WIDTH], &self.label);
        put_padded(&mut out[TEXT_OFFSET..TEXT_OFFSET + TEXT_WIDTH], &self.text);
        out
    }

    pub fn from_bytes(raw: &[u8; RECORD_WIDTH]) -> Self {
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&raw[..4]);
        Self {
            tag: i32::from_ne_bytes(tag),
            label: take_trimmed(&raw[LABEL_OFFSET..LABEL_OFFSET + LABEL_WIDTH]),
            text: take_trimmed(&raw[TEXT_OFFSET..TEXT_OFFSET + TEXT_WIDTH]),
        }
    }
}

pub fn pack_tag(slot: Slot, priority: Priority) -> i32 {
    (slot.number() + 256 * priority.0) as i32
}

fn put_padded(field: &mut [u8], s: &str) {
    field.fill(b' ');
    let n = s.len().min(field.len());
    field[..n].copy_from_slice(&s.as_bytes()[..n]);
}

fn take_trimmed(field: &[u8]) -> String {
    String::from_utf8_lossy(field)
        .trim_end_matches([' ', '\0'])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_packs_slot_and_priority() {
        let s = Slot::new(12).unwrap();
        let r = MessageRecord::new(s, Priority::ERROR, "IMEAN", "x");
        assert_eq!(r.tag, 12 + 256 * 8);
        assert_eq!(r.slot_number(), 12);
        assert_eq!(r.priority(), Priority::ERROR);
        assert!(r.belongs_to(s));
        assert!(!r.belongs_to(Slot::new(1).unwrap()));
    }

    #[test]
    fn bytes_roundtrip_and_truncate() {
        let s = Slot::new(1).unwrap();
        let long = "y".repeat(TEXT_WIDTH + 10);
        let r = MessageRecord::new(s, Priority::INFO, "IMHEAD", long);
        let back = MessageRecord::from_bytes(&r.to_bytes());
        assert_eq!(back.label, "IMHEA");
        assert_eq!(back.text.len(), TEXT_WIDTH);
        assert_eq!(back.tag, r.tag);
    }

    #[test]
    fn format_pads_label() {
        let s = Slot::new(1).unwrap();
        let r = MessageRecord::new(s, Priority::INFO, "AIPS", "Begins");
        assert_eq!(r.format(s), "AIPS 1: Begins");
        let r = MessageRecord::new(s, Priority::INFO, "IMEAN", "Appears to have ended successfully");
        assert_eq!(r.format(s), "IMEAN1: Appears to have ended successfully");
    }
}

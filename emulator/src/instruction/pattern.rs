/// A `(mask, value)` pair recognizing one instruction encoding.
///
/// Built from a 32-character template of `0`, `1` and `?` (wildcard), most
/// significant bit first. Spaces group fields for readability and are
/// ignored, so `"0000000 ????? ????? 000 ????? 01100 11"` is `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pattern {
    pub mask: u32,
    pub value: u32,
}

impl Pattern {
    /// Converts a template into its mask/value pair. Evaluated at compile
    /// time for the instruction table, so a malformed template fails the build.
    pub const fn from_template(template: &str) -> Self {
        let bytes = template.as_bytes();
        let mut mask = 0u32;
        let mut value = 0u32;
        let mut bits = 0;
        let mut i = 0;
        while i < bytes.len() {
            let (fixed, bit) = match bytes[i] {
                b' ' => {
                    i += 1;
                    continue;
                }
                b'0' => (1, 0),
                b'1' => (1, 1),
                b'?' => (0, 0),
                _ => panic!("pattern template may only contain '0', '1', '?' and spaces"),
            };
            if bits == 32 {
                panic!("pattern template has more than 32 bits");
            }
            mask = (mask << 1) | fixed;
            value = (value << 1) | bit;
            bits += 1;
            i += 1;
        }
        if bits != 32 {
            panic!("pattern template has fewer than 32 bits");
        }
        Pattern { mask, value }
    }

    #[inline]
    pub fn matches(&self, word: u32) -> bool {
        word & self.mask == self.value
    }
}

#[cfg(test)]
mod test_pattern {
    use super::*;

    #[test]
    fn fixed_and_wildcard_bits() {
        let addi = Pattern::from_template("??????? ????? ????? 000 ????? 00100 11");
        assert_eq!(0x0000707f, addi.mask);
        assert_eq!(0x00000013, addi.value);
        assert!(addi.matches(0x00108093)); // addi x1, x1, 1
        assert!(!addi.matches(0x00108033)); // add x0, x1, x1
    }

    #[test]
    fn fully_fixed_template() {
        let ebreak = Pattern::from_template("0000000 00001 00000 000 00000 11100 11");
        assert_eq!(u32::MAX, ebreak.mask);
        assert_eq!(0x00100073, ebreak.value);
    }

    #[test]
    fn wildcard_template_matches_everything() {
        let inv = Pattern::from_template("??????? ????? ????? ??? ????? ????? ??");
        assert_eq!(0, inv.mask);
        assert!(inv.matches(0));
        assert!(inv.matches(u32::MAX));
    }

    #[test]
    #[should_panic(expected = "fewer than 32 bits")]
    fn short_template_is_rejected() {
        Pattern::from_template("0101");
    }

    #[test]
    #[should_panic(expected = "only contain")]
    fn bad_character_is_rejected() {
        Pattern::from_template("??????? ????? ????? 000 ????? 00100 1x");
    }
}

//! Pixel-format candidate search shared by the backends.
//!
//! Backends that can only answer "give me the closest format to this
//! descriptor" (Win32 `ChoosePixelFormat`, `glXChooseVisual`) are driven
//! through [`search`]: candidates are probed from the deepest depth buffer
//! down and, within each depth, from the widest colour buffer down. The first
//! granted format that meets the probed candidate wins; if none ever does the
//! first format the driver granted at all is used instead.

use crate::types::PixelFormat;

/// Depth-buffer sizes probed, deepest first.
pub const DEPTH_CANDIDATES: [u8; 3] = [32, 24, 16];
/// Colour-buffer sizes probed, widest first.
pub const COLOR_CANDIDATES: [u8; 2] = [32, 24];

/// One probe of the candidate grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatCandidate {
    pub color_bits: u8,
    pub depth_bits: u8,
    pub double_buffer: bool,
}

/// Runs the candidate search with `probe` answering each candidate.
///
/// `probe` returns the format the platform would grant for the candidate, or
/// `None` when it grants nothing.
pub fn search<F>(double_buffer: bool, mut probe: F) -> Option<PixelFormat>
where
    F: FnMut(FormatCandidate) -> Option<PixelFormat>,
{
    let mut first_granted = None;
    for depth_bits in DEPTH_CANDIDATES {
        for color_bits in COLOR_CANDIDATES {
            let candidate = FormatCandidate {
                color_bits,
                depth_bits,
                double_buffer,
            };
            let Some(granted) = probe(candidate) else {
                continue;
            };
            if granted.satisfies(color_bits, depth_bits) {
                tracing::trace!(?candidate, ?granted, "pixel format satisfies candidate");
                return Some(granted);
            }
            if first_granted.is_none() {
                first_granted = Some(granted);
            }
        }
    }

    if let Some(fallback) = first_granted {
        tracing::warn!(
            color_bits = fallback.color_bits,
            depth_bits = fallback.depth_bits,
            "no pixel format met the probed candidates; using the first one granted"
        );
    }
    first_granted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(id: u64, color_bits: u8, depth_bits: u8) -> PixelFormat {
        PixelFormat {
            id,
            color_bits,
            depth_bits,
            double_buffer: true,
            needs_palette: false,
        }
    }

    #[test]
    fn probes_depth_major_colour_minor() {
        let mut seen = Vec::new();
        let result = search(true, |candidate| {
            seen.push((candidate.depth_bits, candidate.color_bits));
            None
        });
        assert!(result.is_none());
        assert_eq!(
            seen,
            vec![(32, 32), (32, 24), (24, 32), (24, 24), (16, 32), (16, 24)]
        );
    }

    #[test]
    fn first_satisfying_candidate_wins() {
        // The driver only has a 24/24 format and always hands it back.
        let result = search(true, |_| Some(format(7, 24, 24))).expect("format");
        assert_eq!(result.id, 7);

        let mut probes = 0;
        search(true, |_| {
            probes += 1;
            Some(format(7, 24, 24))
        });
        // 32/32 and 32/24 miss on depth, 24/32 misses on colour, 24/24 matches.
        assert_eq!(probes, 4);
    }

    #[test]
    fn falls_back_to_first_granted_format() {
        let result = search(true, |candidate| {
            Some(format(u64::from(candidate.depth_bits), 16, 8))
        })
        .expect("fallback");
        assert_eq!(result.id, 32, "fallback must be the first non-null probe");
    }

    #[test]
    fn skips_null_probes_when_picking_fallback() {
        let result = search(true, |candidate| {
            (candidate.depth_bits == 16 && candidate.color_bits == 24).then(|| format(3, 8, 8))
        });
        assert_eq!(result.map(|f| f.id), Some(3));
    }

    #[test]
    fn exact_match_found_for_every_supported_combination() {
        for depth in DEPTH_CANDIDATES {
            for color in COLOR_CANDIDATES {
                let table = [format(1, 16, 16), format(2, color, depth)];
                let result = search(true, |candidate| {
                    table
                        .iter()
                        .copied()
                        .find(|f| f.satisfies(candidate.color_bits, candidate.depth_bits))
                        .or(Some(table[0]))
                })
                .unwrap();
                assert!(
                    result.satisfies(color, depth),
                    "depth {depth} colour {color} gave {result:?}"
                );
                assert_eq!(result.id, 2);
            }
        }
    }

    #[test]
    fn double_buffer_preference_is_forwarded() {
        let mut flags = Vec::new();
        search(false, |candidate| {
            flags.push(candidate.double_buffer);
            None
        });
        assert!(flags.iter().all(|flag| !flag));
    }
}

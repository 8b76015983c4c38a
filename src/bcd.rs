use crate::lines::{DigitalLines, Line, LineError};

/// Decode a group of BCD lines into an unsigned integer.
///
/// Lines are taken four at a time, least significant digit first, bit 0 of
/// each digit first. A trailing group with fewer than four lines only
/// contributes the bits it has. Any failing line aborts the decode.
pub fn decode<L: DigitalLines + ?Sized>(lines: &L, group: &[Line]) -> Result<u32, LineError> {
    let mut value = 0u32;
    let mut multiplier = 1u32;

    for digit_lines in group.chunks(4) {
        let mut digit = 0u32;
        for (bit, line) in digit_lines.iter().enumerate() {
            if lines.read(*line)? {
                digit += 1 << bit;
            }
        }
        value += digit * multiplier;
        multiplier = multiplier.saturating_mul(10);
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::SimulatedLines;

    fn set_bits(sim: &SimulatedLines, lines: &[Line], pattern: &[bool]) {
        for (line, level) in lines.iter().zip(pattern) {
            sim.set_level(*line, *level);
        }
    }

    #[test]
    fn test_empty_group_is_zero() {
        let sim = SimulatedLines::new();
        assert_eq!(decode(&sim, &[]).unwrap(), 0);
    }

    #[test]
    fn test_partial_group() {
        let sim = SimulatedLines::new();
        let lines = Line::range_lines();
        // digit 0 = 0b0111, digit 1 = 0b1 (only one line)
        set_bits(&sim, &lines, &[true, true, true, false, true]);
        assert_eq!(decode(&sim, &lines).unwrap(), 17);
    }

    #[test]
    fn test_nine_lines() {
        let sim = SimulatedLines::new();
        let lines: Vec<Line> = Line::data_lines().into_iter().take(9).collect();
        // 5, 8, 1
        set_bits(
            &sim,
            &lines,
            &[true, false, true, false, false, false, false, true, true],
        );
        assert_eq!(decode(&sim, &lines).unwrap(), 185);
    }

    #[test]
    fn test_full_data_group() {
        let sim = SimulatedLines::new();
        sim.present(1999, 0, 0, false, false);
        assert_eq!(decode(&sim, &Line::data_lines()).unwrap(), 1999);

        sim.present(1040, 0, 0, false, false);
        assert_eq!(decode(&sim, &Line::data_lines()).unwrap(), 1040);
    }

    #[test]
    fn test_any_failing_line_fails_decode() {
        let lines = Line::data_lines();
        for failing in &lines {
            let sim = SimulatedLines::new();
            sim.present(1234, 0, 0, false, false);
            sim.fail_line(*failing);
            match decode(&sim, &lines) {
                Err(LineError::Read(line)) => assert_eq!(line, *failing),
                other => panic!("expected read failure on {failing}, got {other:?}"),
            }
        }
    }
}

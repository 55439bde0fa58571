use crate::generator::text::normalize_name;

/// Minimum number of digits in the sequence suffix of a verification code.
pub const SEQUENCE_WIDTH: usize = 4;

/// Derives the verification code for the roster row at `index`.
///
/// The code is the normalized holder name (lowercased, spaces and periods
/// stripped), followed by `serial` and the zero-padded sequence number
/// `start + index`. Nothing here checks for collisions: two jobs sharing a
/// serial must be given non-overlapping start numbers by the caller.
pub fn verification_code(name: &str, serial: &str, start: u32, index: usize) -> String {
    let name_part: String = normalize_name(name)
        .to_lowercase()
        .chars()
        .filter(|c| *c != ' ' && *c != '.')
        .collect();
    let sequence = u64::from(start) + index as u64;
    format!("{name_part}{serial}{sequence:0width$}", width = SEQUENCE_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffix(code: &str) -> u64 {
        code[code.len() - SEQUENCE_WIDTH..].parse().unwrap()
    }

    #[test]
    fn code_is_name_serial_and_padded_sequence() {
        assert_eq!(verification_code("Ada Lovelace", "RFBM", 0, 0), "adalovelaceRFBM0000");
        assert_eq!(verification_code("Ada Lovelace", "RFBM", 10, 3), "adalovelaceRFBM0013");
    }

    #[test]
    fn spaces_and_periods_are_stripped_from_name_part() {
        let code = verification_code("j. r. tolkien", "O", 1, 0);
        assert_eq!(code, "jrtolkienO0001");
    }

    #[test]
    fn sequence_grows_past_four_digits() {
        assert_eq!(verification_code("x", "S", 9999, 1), "xS10000");
    }

    #[test]
    fn suffix_strictly_increases_within_a_job() {
        let names = ["b", "a", "c", "a"];
        let codes: Vec<String> = names
            .iter()
            .enumerate()
            .map(|(i, n)| verification_code(n, "S", 40, i))
            .collect();

        for pair in codes.windows(2) {
            assert!(suffix(&pair[0]) < suffix(&pair[1]));
        }
        assert_eq!(suffix(&codes[0]), 40);
    }

    #[test]
    fn overlapping_start_numbers_collide_across_jobs() {
        // Same serial, second job starts inside the first job's range.
        let first_job: Vec<String> =
            (0..5).map(|i| verification_code("Sam", "EV", 100, i)).collect();
        let second_job: Vec<String> =
            (0..5).map(|i| verification_code("Sam", "EV", 103, i)).collect();

        assert_eq!(first_job[3], second_job[0]);
        assert_eq!(first_job[4], second_job[1]);
    }
}

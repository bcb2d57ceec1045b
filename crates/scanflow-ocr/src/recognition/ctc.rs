//! Greedy CTC decoding of a `[seq_len, vocab_size]` log-probability matrix

use super::dictionary::SymbolDictionary;
use ndarray::ArrayView2;

/// Decoded string and its confidence in `[0, 100]`
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Not trimmed
    pub text: String,
    pub confidence: f32,
}

/// Greedy CTC decode.
///
/// Per timestep the argmax class is emitted only if it is not the blank (index 0),
/// differs from the previous timestep's argmax, and exists in `dict`. Confidence is
/// the mean of `exp(max)` over emitted symbols, times 100, clamped to `[0, 100]`.
#[must_use = "returns the decoded text"]
pub fn ctc_greedy_decode(probs: ArrayView2<'_, f32>, dict: &SymbolDictionary) -> Decoded {
    let mut text = String::new();
    let mut score_sum = 0.0_f64;
    let mut emitted = 0_usize;
    let mut prev: Option<usize> = None;

    for row in probs.rows() {
        // First index wins ties
        let Some((index, max)) = row
            .iter()
            .copied()
            .enumerate()
            .reduce(|best, cur| if cur.1.total_cmp(&best.1).is_gt() { cur } else { best })
        else {
            prev = Some(0);
            continue;
        };

        if index != 0 && prev != Some(index) {
            if let Some(symbol) = dict.symbol(index) {
                text.push_str(symbol);
                score_sum += f64::from(max).exp();
                emitted += 1;
            }
        }
        prev = Some(index);
    }

    Decoded {
        text,
        confidence: mean_confidence(score_sum, emitted),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn mean_confidence(sum: f64, count: usize) -> f32 {
    if count == 0 {
        return 0.0;
    }
    let value = (sum / count as f64 * 100.0) as f32;
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn dict() -> SymbolDictionary {
        SymbolDictionary::from_lines(["a", "b", "c"], true).unwrap()
    }

    /// One row per class index, with log-probability `lp` at that index
    fn matrix(classes: &[usize], lp: f32) -> Array2<f32> {
        let mut m = Array2::from_elem((classes.len(), 5), -10.0_f32);
        for (t, &c) in classes.iter().enumerate() {
            m[[t, c]] = lp;
        }
        m
    }

    #[test]
    fn test_collapse_and_blank_separation() {
        let m = matrix(&[1, 1, 0, 1, 2, 2, 3], 0.0);
        let out = ctc_greedy_decode(m.view(), &dict());
        assert_eq!(out.text, "aabc");
    }

    #[test]
    fn test_all_blank_is_empty_zero() {
        let m = matrix(&[0, 0, 0], 0.0);
        let out = ctc_greedy_decode(m.view(), &dict());
        assert_eq!(out.text, "");
        assert_eq!(out.confidence, 0.0);
    }

    #[test]
    fn test_space_symbol_not_trimmed() {
        let m = matrix(&[4, 1, 4], 0.0);
        let out = ctc_greedy_decode(m.view(), &dict());
        assert_eq!(out.text, " a ");
    }

    #[test]
    fn test_confidence_from_log_probs() {
        let m = matrix(&[1, 2], 0.5_f32.ln());
        let out = ctc_greedy_decode(m.view(), &dict());
        assert!((out.confidence - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_confidence_capped() {
        // Raw probabilities give exp(p) > 1
        let m = matrix(&[1, 2, 3], 0.9);
        let out = ctc_greedy_decode(m.view(), &dict());
        assert_eq!(out.confidence, 100.0);
    }

    #[test]
    fn test_out_of_dictionary_index_skipped() {
        let mut m = Array2::from_elem((3, 8), -10.0_f32);
        m[[0, 1]] = 0.0;
        m[[1, 7]] = 0.0;
        m[[2, 2]] = 0.0;
        let out = ctc_greedy_decode(m.view(), &dict());
        assert_eq!(out.text, "ab");
    }

    #[test]
    fn test_empty_matrix() {
        let m = Array2::<f32>::zeros((0, 5));
        let out = ctc_greedy_decode(m.view(), &dict());
        assert!(out.text.is_empty());
        assert_eq!(out.confidence, 0.0);
    }
}

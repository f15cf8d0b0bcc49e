//! Math utility functions

/// Softmax function
pub fn softmax(x: &[f32]) -> Vec<f32> {
    let max_val = x.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_vals: Vec<f32> = x.iter().map(|v| (v - max_val).exp()).collect();
    let sum: f32 = exp_vals.iter().sum();
    exp_vals.iter().map(|v| v / sum).collect()
}

/// Argmax - index of the maximum value, the first one on ties. NaN never wins.
pub fn argmax(x: &[f32]) -> Option<usize> {
    x.iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (idx, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((idx, v)),
        })
        .map(|(idx, _)| idx)
}

/// True when the values already look like a probability distribution
pub fn is_probability_vector(x: &[f32], tolerance: f32) -> bool {
    if x.is_empty() || x.iter().any(|v| !(0.0..=1.0).contains(v)) {
        return false;
    }
    let sum: f32 = x.iter().sum();
    (sum - 1.0).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax() {
        let x = vec![1.0, 2.0, 3.0];
        let result = softmax(&x);
        let sum: f32 = result.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(result[2] > result[1] && result[1] > result[0]);
    }

    #[test]
    fn test_softmax_large_logits_stay_finite() {
        let result = softmax(&[1000.0, 1000.0]);
        assert!((result[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[1.0, 5.0, 3.0, 2.0]), Some(1));
        assert_eq!(argmax(&[0.25, 0.25, 0.25, 0.25]), Some(0));
        assert_eq!(argmax(&[f32::NAN, 0.1]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_is_probability_vector() {
        assert!(is_probability_vector(&[0.1, 0.2, 0.7], 1e-3));
        assert!(!is_probability_vector(&[2.0, -1.0, 0.0], 1e-3));
        assert!(!is_probability_vector(&[0.1, 0.1], 1e-3));
        assert!(!is_probability_vector(&[], 1e-3));
    }
}

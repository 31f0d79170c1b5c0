//! Softmax cross-entropy for the two-class head.

use ndarray::Array2;

/// Mean cross-entropy over the batch together with the gradient at the
/// logits, computed in one pass. Rows are softmaxed with the usual
/// max-shift for stability; the gradient is `(softmax - onehot) / N`.
pub fn cross_entropy_with_grad(logits: &Array2<f32>, labels: &[u8]) -> (f32, Array2<f32>) {
    let n = labels.len();
    debug_assert_eq!(logits.nrows(), n);

    let mut grad = Array2::zeros(logits.raw_dim());
    let mut loss = 0.0f32;
    for (i, &label) in labels.iter().enumerate() {
        let row = logits.row(i);
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        let exps: Vec<f32> = row.iter().map(|&v| (v - max).exp()).collect();
        let denom: f32 = exps.iter().sum();
        let target = label as usize;
        loss -= (exps[target] / denom).ln();
        for (class, &e) in exps.iter().enumerate() {
            let p = e / denom;
            grad[[i, class]] = (p - if class == target { 1.0 } else { 0.0 }) / n as f32;
        }
    }
    (loss / n as f32, grad)
}

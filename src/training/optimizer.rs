//! Adam optimizer with named per-parameter state.
//!
//! Moment buffers are keyed by parameter name, so one optimizer instance
//! serves every tensor of the model regardless of rank; each slot carries
//! its own step counter for bias correction. Weight decay is the classic
//! L2 form folded into the gradient.

use std::collections::HashMap;

use ndarray::{Array, ArrayD, Dimension, IxDyn};

struct AdamSlot {
    step: u64,
    first_moment: ArrayD<f32>,
    second_moment: ArrayD<f32>,
}

impl AdamSlot {
    fn new(shape: IxDyn) -> AdamSlot {
        AdamSlot {
            step: 0,
            first_moment: ArrayD::zeros(shape.clone()),
            second_moment: ArrayD::zeros(shape),
        }
    }
}

pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    slots: HashMap<String, AdamSlot>,
}

impl Adam {
    pub fn new(learning_rate: f32, weight_decay: f32) -> Adam {
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay,
            slots: HashMap::new(),
        }
    }

    /// One update for a named parameter. `grad` must have the parameter's
    /// shape; the slot is created lazily on first sight of the name.
    pub fn update<D: Dimension>(
        &mut self,
        name: &str,
        param: &mut Array<f32, D>,
        grad: &Array<f32, D>,
    ) {
        let mut g = grad.to_owned().into_dyn();
        if self.weight_decay > 0.0 {
            let decay = self.weight_decay;
            g.zip_mut_with(&param.view().into_dyn(), |gi, &pi| *gi += decay * pi);
        }

        let slot = self
            .slots
            .entry(name.to_string())
            .or_insert_with(|| AdamSlot::new(g.raw_dim()));
        slot.step += 1;

        let beta1 = self.beta1;
        let beta2 = self.beta2;
        slot.first_moment
            .zip_mut_with(&g, |m, &gi| *m = beta1 * *m + (1.0 - beta1) * gi);
        slot.second_moment
            .zip_mut_with(&g, |v, &gi| *v = beta2 * *v + (1.0 - beta2) * gi * gi);

        let bias1 = 1.0 - beta1.powi(slot.step as i32);
        let bias2 = 1.0 - beta2.powi(slot.step as i32);
        let epsilon = self.epsilon;
        let mut delta = slot.first_moment.clone();
        delta.zip_mut_with(&slot.second_moment, |m, &v| {
            *m = (*m / bias1) / ((v / bias2).sqrt() + epsilon);
        });

        let lr = self.learning_rate;
        param.zip_mut_with(&delta, |p, &d| *p -= lr * d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array2};

    #[test]
    fn first_update_moves_against_the_gradient() {
        let mut adam = Adam::new(0.1, 0.0);
        let mut param: Array1<f32> = array![1.0, -1.0];
        let grad: Array1<f32> = array![0.5, -0.5];
        adam.update("p", &mut param, &grad);
        assert!(param[0] < 1.0);
        assert!(param[1] > -1.0);
    }

    #[test]
    fn repeated_updates_descend_a_quadratic() {
        // Minimize 0.5 * x^2, gradient is x.
        let mut adam = Adam::new(0.05, 0.0);
        let mut param: Array1<f32> = array![3.0];
        for _ in 0..200 {
            let grad = param.clone();
            adam.update("x", &mut param, &grad);
        }
        assert!(param[0].abs() < 0.5, "did not converge: {}", param[0]);
    }

    #[test]
    fn slots_are_independent_per_name() {
        let mut adam = Adam::new(0.1, 0.0);
        let mut a: Array1<f32> = array![1.0];
        let mut b: Array2<f32> = array![[1.0, 1.0]];
        adam.update("a", &mut a, &array![1.0]);
        adam.update("b", &mut b, &array![[1.0, 1.0]]);
        assert_eq!(adam.slots.len(), 2);
        assert_eq!(adam.slots["a"].step, 1);
    }

    #[test]
    fn weight_decay_shrinks_parameters_without_gradient() {
        let mut plain = Adam::new(0.1, 0.0);
        let mut decayed = Adam::new(0.1, 0.01);
        let mut p1: Array1<f32> = array![2.0];
        let mut p2: Array1<f32> = array![2.0];
        let zero: Array1<f32> = array![0.0];
        plain.update("p", &mut p1, &zero);
        decayed.update("p", &mut p2, &zero);
        assert_eq!(p1[0], 2.0);
        assert!(p2[0] < 2.0);
    }
}

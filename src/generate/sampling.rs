//! Logits processors and token selection.
//!
//! The order follows the usual constrained-decoding pipeline: processors that always run
//! (repetition penalty), then warpers that only matter when sampling (temperature, top-p),
//! then selection.

use crate::error::Result;
use crate::model::TokenId;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

pub trait LogitsProcessor: Send {
    fn process(&self, tokens: &[TokenId], logits: &mut [f32]);
}

/// Penalizes every token already present in the sequence. Positive logits are divided by
/// the penalty and negative ones multiplied, so a penalty > 1 always lowers the score.
#[derive(Debug, Clone, Copy)]
pub struct RepetitionPenalty(pub f32);

impl LogitsProcessor for RepetitionPenalty {
    fn process(&self, tokens: &[TokenId], logits: &mut [f32]) {
        let penalty = self.0;
        let mut seen = vec![false; logits.len()];
        for &t in tokens {
            let i = t as usize;
            if i >= logits.len() || seen[i] {
                continue;
            }
            seen[i] = true;
            let l = logits[i];
            logits[i] = if l < 0.0 { l * penalty } else { l / penalty };
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Temperature(pub f32);

impl LogitsProcessor for Temperature {
    fn process(&self, _tokens: &[TokenId], logits: &mut [f32]) {
        for l in logits.iter_mut() {
            *l /= self.0;
        }
    }
}

/// Nucleus filter: keeps the smallest set of most likely tokens whose probability mass
/// reaches `p`, never fewer than one.
#[derive(Debug, Clone, Copy)]
pub struct TopP(pub f32);

impl LogitsProcessor for TopP {
    fn process(&self, _tokens: &[TokenId], logits: &mut [f32]) {
        let probs = softmax(logits);
        let mut order: Vec<usize> = (0..logits.len()).collect();
        order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

        let mut mass = 0.0;
        let mut kept = 0;
        for &i in &order {
            if kept > 0 && mass >= self.0 {
                break;
            }
            mass += probs[i];
            kept += 1;
        }
        for &i in &order[kept..] {
            logits[i] = f32::NEG_INFINITY;
        }
    }
}

/// Build the chain for the given settings. Neutral values (penalty 1, temperature 1,
/// top-p 1) are left out.
pub fn processors(
    repetition_penalty: f32,
    temperature: f32,
    top_p: f32,
    do_sample: bool,
) -> Vec<Box<dyn LogitsProcessor>> {
    let mut chain: Vec<Box<dyn LogitsProcessor>> = Vec::new();
    if repetition_penalty > 0.0 && repetition_penalty != 1.0 {
        chain.push(Box::new(RepetitionPenalty(repetition_penalty)));
    }
    if do_sample {
        if temperature > 0.0 && temperature != 1.0 {
            chain.push(Box::new(Temperature(temperature)));
        }
        if top_p < 1.0 {
            chain.push(Box::new(TopP(top_p)));
        }
    }
    chain
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return vec![0.0; logits.len()];
    }
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

pub fn argmax(logits: &[f32]) -> TokenId {
    let mut best = 0;
    for (i, &l) in logits.iter().enumerate() {
        if l > logits[best] {
            best = i;
        }
    }
    best as TokenId
}

pub fn sample<R: Rng + ?Sized>(logits: &[f32], rng: &mut R) -> Result<TokenId> {
    let dist = WeightedIndex::new(softmax(logits))?;
    Ok(dist.sample(rng) as TokenId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn repetition_penalty_lowers_seen_tokens_once() {
        let mut logits = vec![2.0, -2.0, 2.0];
        RepetitionPenalty(2.0).process(&[0, 1, 0, 9], &mut logits);
        assert_eq!(logits, vec![1.0, -4.0, 2.0]);
    }

    #[test]
    fn temperature_scales() {
        let mut logits = vec![1.0, 2.0];
        Temperature(0.5).process(&[], &mut logits);
        assert_eq!(logits, vec![2.0, 4.0]);
    }

    #[test]
    fn top_p_keeps_the_nucleus() {
        // probabilities roughly 0.64, 0.24, 0.09, 0.03
        let mut logits = vec![3.0, 2.0, 1.0, 0.0];
        TopP(0.8).process(&[], &mut logits);
        assert!(logits[0].is_finite());
        assert!(logits[1].is_finite());
        assert_eq!(logits[2], f32::NEG_INFINITY);
        assert_eq!(logits[3], f32::NEG_INFINITY);
    }

    #[test]
    fn top_p_always_keeps_one() {
        let mut logits = vec![0.0, 10.0];
        TopP(0.0).process(&[], &mut logits);
        assert_eq!(logits[0], f32::NEG_INFINITY);
        assert_eq!(logits[1], 10.0);
    }

    #[test]
    fn greedy_chain_skips_warpers() {
        assert_eq!(processors(1.1, 0.4, 0.9, false).len(), 1);
        assert_eq!(processors(1.1, 0.4, 0.9, true).len(), 3);
        assert!(processors(1.0, 1.0, 1.0, true).is_empty());
    }

    #[test]
    fn sampling_respects_masked_tokens() {
        let mut rng = StdRng::seed_from_u64(7);
        let logits = vec![f32::NEG_INFINITY, 0.0, f32::NEG_INFINITY];
        for _ in 0..32 {
            assert_eq!(sample(&logits, &mut rng).unwrap(), 1);
        }
        assert_eq!(argmax(&[0.5, 3.0, 1.0]), 1);
    }
}

use llama_cpp_2::sampling::LlamaSampler;

use super::SamplingParams;

/// Repetition window and penalty llama.cpp applies when callers only pick
/// temperature, top-p and top-k.
const PENALTY_LAST_N: i32 = 64;
const REPEAT_PENALTY: f32 = 1.1;
const MIN_P: f32 = 0.05;

/// Build the sampler chain for one stream.
///
/// Order: penalties, top-k, top-p, min-p, temperature, then the final
/// distribution draw.
pub(crate) fn create_sampler(params: &SamplingParams) -> LlamaSampler {
    log::debug!(
        "Using sampler chain: temp={}, top_p={}, top_k={}, seed={}",
        params.temperature,
        params.top_p,
        params.top_k,
        params.seed
    );

    let top_k = i32::try_from(params.top_k).unwrap_or(i32::MAX);
    let samplers = vec![
        LlamaSampler::penalties(PENALTY_LAST_N, REPEAT_PENALTY, 0.0, 0.0),
        LlamaSampler::top_k(top_k),
        LlamaSampler::top_p(params.top_p, 1),
        LlamaSampler::min_p(MIN_P, 1),
        LlamaSampler::temp(params.temperature),
        LlamaSampler::dist(params.seed),
    ];
    LlamaSampler::chain_simple(samplers)
}

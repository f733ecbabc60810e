//! Layer-Offload Planner (C5, spec §4.5).

use crate::model::{OffloadPlan, SpeedTier};

const GIB: u64 = 1 << 30;
const SYSTEM_MARGIN_BYTES: u64 = 2 * GIB;
const MIN_VIABLE_VRAM_LAYERS: usize = 4;

/// Size → layer-count bins (spec §4.5 step 2), used when the caller doesn't
/// already know the model's layer count.
fn estimate_layer_count(model_size_bytes: u64) -> usize {
    const GB: u64 = 1_000_000_000;
    match model_size_bytes {
        n if n <= 15 * GB / 10 => 16,
        n if n <= 4 * GB => 26,
        n if n <= 8 * GB => 32,
        n if n <= 15 * GB => 40,
        _ => 60,
    }
}

/// `plan(model_size_bytes, layer_count?, vram_free_bytes, context_size) -> [OffloadPlan]`.
///
/// Returns plans sorted by descending speed tier; an empty vec means nothing
/// fits (spec §4.5 contract).
pub fn plan(
    model_size_bytes: u64,
    layer_count: Option<usize>,
    vram_free_bytes: u64,
    context_size: usize,
    ram_free_bytes: u64,
) -> Vec<OffloadPlan> {
    let layer_count = layer_count.unwrap_or_else(|| estimate_layer_count(model_size_bytes));
    let context_reserve = (context_size as u64).saturating_mul(3) / 2;
    let remaining_vram = vram_free_bytes
        .saturating_sub(context_reserve)
        .saturating_sub(SYSTEM_MARGIN_BYTES);

    let mut plans = Vec::new();

    if remaining_vram >= model_size_bytes {
        plans.push(OffloadPlan {
            vram_layers: layer_count,
            ram_layers: 0,
            vram_bytes: model_size_bytes,
            ram_bytes: 0,
            speed_tier: SpeedTier::Fast,
            label: "fully resident in VRAM".to_string(),
        });
    } else if model_size_bytes > 0 {
        let ratio = remaining_vram as f64 / model_size_bytes as f64;
        let vram_layers = ((layer_count as f64) * ratio * 0.9).floor() as usize;

        if vram_layers >= MIN_VIABLE_VRAM_LAYERS {
            let vram_fraction = vram_layers as f64 / layer_count as f64;
            let vram_bytes = (model_size_bytes as f64 * vram_fraction) as u64;
            plans.push(OffloadPlan {
                vram_layers,
                ram_layers: layer_count - vram_layers,
                vram_bytes,
                ram_bytes: model_size_bytes.saturating_sub(vram_bytes),
                speed_tier: SpeedTier::Medium,
                label: format!("{vram_layers}/{layer_count} layers offloaded to VRAM"),
            });
        }
    }

    if ram_free_bytes >= model_size_bytes {
        plans.push(OffloadPlan {
            vram_layers: 0,
            ram_layers: layer_count,
            vram_bytes: 0,
            ram_bytes: model_size_bytes,
            speed_tier: SpeedTier::Slow,
            label: "CPU-only".to_string(),
        });
    }

    plans.sort_by(|a, b| b.speed_tier.cmp(&a.speed_tier));
    plans
}

#[cfg(test)]
mod tests {
    use super::*;

    const GB: u64 = 1_000_000_000;

    #[test]
    fn fits_fully_emits_fast_plan() {
        let plans = plan(4 * GB, Some(26), 16 * GIB, 4096, 32 * GIB);
        assert_eq!(plans[0].speed_tier, SpeedTier::Fast);
        assert_eq!(plans[0].vram_layers, 26);
    }

    #[test]
    fn tight_vram_emits_medium_plan() {
        let plans = plan(8 * GB, Some(32), 4 * GIB, 2048, 32 * GIB);
        let medium = plans.iter().find(|p| p.speed_tier == SpeedTier::Medium);
        assert!(medium.is_some());
        assert!(medium.unwrap().vram_layers >= 4);
    }

    #[test]
    fn too_little_vram_drops_to_cpu_only() {
        let plans = plan(8 * GB, Some(32), 512_000_000, 2048, 32 * GIB);
        assert!(plans.iter().all(|p| p.speed_tier != SpeedTier::Medium));
    }

    #[test]
    fn nothing_fits_returns_empty() {
        let plans = plan(8 * GB, Some(32), 0, 2048, 1 * GB);
        assert!(plans.is_empty());
    }

    #[test]
    fn plans_sorted_descending_by_speed_tier() {
        let plans = plan(4 * GB, Some(26), 3 * GIB, 4096, 32 * GIB);
        for pair in plans.windows(2) {
            assert!(pair[0].speed_tier >= pair[1].speed_tier);
        }
    }

    #[test]
    fn estimate_layer_count_bins() {
        assert_eq!(estimate_layer_count(1_000_000_000), 16);
        assert_eq!(estimate_layer_count(4_000_000_000), 26);
        assert_eq!(estimate_layer_count(20_000_000_000), 60);
    }
}

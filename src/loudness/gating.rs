//! Integrated loudness with BS.1770 two-stage gating.

/// Absolute gate in LUFS.
pub const ABSOLUTE_GATE: f64 = -70.0;
/// Relative gate offset in LU below the absolute-gated mean.
pub const RELATIVE_GATE: f64 = -10.0;

const BINS_PER_LU: f64 = 10.0;
/// 0.1 LU bins from the absolute gate up to +30 LUFS.
const BIN_COUNT: usize = 1000;

/// Converts a channel-weighted mean square to LUFS.
pub fn power_to_lufs(power: f64) -> f64 {
    if power > 0.0 {
        -0.691 + 10.0 * power.log10()
    } else {
        f64::NEG_INFINITY
    }
}

/// Running integrated loudness over 400 ms blocks.
///
/// Blocks above the absolute gate land in a 0.1 LU histogram that keeps the
/// exact energy sum and count per bin, so memory stays fixed however long
/// the session runs and the gated mean is computed from true energies. Only
/// the relative gate threshold is quantized to the bin grid.
#[derive(Debug, Clone)]
pub struct GatedLoudness {
    energy: Vec<f64>,
    counts: Vec<u64>,
    gated_energy: f64,
    gated_count: u64,
    all_energy: f64,
    all_count: u64,
}

impl Default for GatedLoudness {
    fn default() -> Self {
        Self {
            energy: vec![0.0; BIN_COUNT],
            counts: vec![0; BIN_COUNT],
            gated_energy: 0.0,
            gated_count: 0,
            all_energy: 0.0,
            all_count: 0,
        }
    }
}

impl GatedLoudness {
    /// Records one 400 ms block by its channel-weighted mean square.
    pub fn add_block(&mut self, power: f64) {
        self.all_energy += power;
        self.all_count += 1;

        let loudness = power_to_lufs(power);
        if loudness < ABSOLUTE_GATE {
            return;
        }

        let index = bin_index(loudness);
        self.energy[index] += power;
        self.counts[index] += 1;
        self.gated_energy += power;
        self.gated_count += 1;
    }

    /// Integrated loudness with both gates applied.
    ///
    /// `NEG_INFINITY` until a block passes the absolute gate.
    pub fn gated(&self) -> f64 {
        if self.gated_count == 0 {
            return f64::NEG_INFINITY;
        }

        let threshold = power_to_lufs(self.gated_energy / self.gated_count as f64) + RELATIVE_GATE;
        let first = if threshold <= ABSOLUTE_GATE {
            0
        } else {
            (((threshold - ABSOLUTE_GATE) * BINS_PER_LU).ceil() as usize).min(BIN_COUNT)
        };

        let (energy, count) = self.energy[first..]
            .iter()
            .zip(&self.counts[first..])
            .fold((0.0, 0u64), |(e, c), (&be, &bc)| (e + be, c + bc));

        if count == 0 {
            return f64::NEG_INFINITY;
        }
        power_to_lufs(energy / count as f64)
    }

    /// Plain mean over every block, without gating.
    pub fn ungated(&self) -> f64 {
        if self.all_count == 0 {
            return f64::NEG_INFINITY;
        }
        power_to_lufs(self.all_energy / self.all_count as f64)
    }

    /// Number of blocks recorded, gated or not.
    pub fn block_count(&self) -> u64 {
        self.all_count
    }

    /// Clears every block.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn bin_index(loudness: f64) -> usize {
    let index = ((loudness - ABSOLUTE_GATE) * BINS_PER_LU).floor();
    (index.max(0.0) as usize).min(BIN_COUNT - 1)
}

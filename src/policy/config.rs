/// How many work orders `generate_work_orders` produces when no count is given.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DefaultOrderCount {
    /// Top the capsule up to every share: `n - saved`.
    AllShares,
    /// Only what `combine` needs: `m - saved`.
    Threshold,
}

impl DefaultOrderCount {
    pub fn remaining(self, threshold: usize, shares: usize, saved: usize) -> usize {
        let target = match self {
            DefaultOrderCount::AllShares => shares,
            DefaultOrderCount::Threshold => threshold,
        };
        target.saturating_sub(saved)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LedgerConfig {
    pub default_order_count: DefaultOrderCount,
    /// Check every returned CFrag's proof before saving it.
    pub verify_cfrags: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            default_order_count: DefaultOrderCount::AllShares,
            verify_cfrags: true,
        }
    }
}

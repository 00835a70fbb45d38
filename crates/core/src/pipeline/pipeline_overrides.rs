//! Classification overrides applied on top of a provider's answer.

use radar_market_data::SecurityType;

/// Liquid MOEX shares that some providers also list as bond-like
/// instruments. These are always shares.
pub const FORCED_SHARE_TICKERS: &[&str] = &[
    "GAZP", "SBER", "LKOH", "ROSN", "NVTK", "MAGN", "YNDX", "TCSG", "VKCO", "AFLT",
];

pub fn is_forced_share(ticker: &str) -> bool {
    let ticker = ticker.trim();
    FORCED_SHARE_TICKERS
        .iter()
        .any(|forced| forced.eq_ignore_ascii_case(ticker))
}

/// Final security type for a provider hit.
///
/// A forced-share ticker is always a share. A position already declared a
/// share keeps that type when the provider calls it a bond. Otherwise the
/// provider decides.
pub fn reconcile_type(
    provider_type: SecurityType,
    ticker: Option<&str>,
    declared: Option<SecurityType>,
) -> SecurityType {
    if ticker.is_some_and(is_forced_share) {
        return SecurityType::Share;
    }
    if declared == Some(SecurityType::Share) && provider_type == SecurityType::Bond {
        return SecurityType::Share;
    }
    provider_type
}

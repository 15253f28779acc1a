const CI_TAG: &str = env!("GOVEE_DECK_CI_TAG");
const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The version reported by `--version` and logged at startup;
/// prefers the build tag when one was captured.
pub fn deck_version() -> &'static str {
    if CI_TAG.is_empty() {
        PKG_VERSION
    } else {
        CI_TAG
    }
}

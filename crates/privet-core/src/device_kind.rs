/// UI device kind for a model manifest id, keyed by its first two characters.
///
/// Unknown prefixes fall back to `vendor`.
pub fn device_ui_kind(model_id: &str) -> &'static str {
    match model_id.get(..2).unwrap_or_default() {
        "AB" => "developmentBoard",
        "AC" => "accessPoint",
        "AD" => "speaker",
        "AE" => "printer",
        "AF" => "scanner",
        "AH" => "acHeating",
        "AI" => "light",
        "AJ" => "toy",
        "AK" => "aggregator",
        "AL" => "storage",
        "AM" => "camera",
        "AN" => "video",
        "AO" => "lock",
        _ => "vendor",
    }
}

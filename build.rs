fn main() {
    // Build scripts run on the host, so the target comes from cargo's cfg
    // variables. ESP-IDF environment setup is only needed for espidf targets
    // (Xtensa and RISC-V chips alike).
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "espidf" {
        embuild::espidf::sysenv::output();
    } else if std::env::var_os("CARGO_FEATURE_ESP32").is_some() {
        println!("cargo:warning=feature `esp32` enabled for a non-espidf target ({target_os})");
    }
}

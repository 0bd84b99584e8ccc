//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary text through `AppConfig::parse()` and, when it parses,
//! builds a discoverer and widgets from it.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = ctxmesh_config::AppConfig::parse(s) else {
        return;
    };
    let discoverer = ctxmesh_core::Discoverer::from_config(&config);
    for widget in &config.widgets {
        let _ = ctxmesh_core::Widget::from_config(&discoverer, widget);
    }
});

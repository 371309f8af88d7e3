// SPDX-License-Identifier: AGPL-3.0-or-later
#![no_main]

use libfuzzer_sys::fuzz_target;
use orgdown_core::{ExportConfig, Exporter, OrgModeHandler, ParseConfig, Parser};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(doc) = OrgModeHandler::new().parse(input, &ParseConfig::default()) else {
        return;
    };
    for backend in ["md", "html"] {
        let config = ExportConfig::default().with_backend(backend);
        let _ = Exporter::new().export(doc.clone(), &config);
    }
});

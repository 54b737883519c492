// SPDX-License-Identifier: AGPL-3.0-or-later
#![no_main]

use inkvault_core::metadata::{compose_metadata, RecordInfo};
use inkvault_core::migration::MigrationEngine;
use inkvault_core::traits::{ConversionOptions, ConverterRegistry};
use inkvault_core::tree::{ExportFormat, Node};
use inkvault_core::validation::Validator;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let validator = Validator::default();
    let _ = validator.validate(&value);

    let Ok(tree) = serde_json::from_value::<Node>(value) else {
        return;
    };
    let record = RecordInfo {
        content_id: "fuzz",
        title: "Fuzz",
        schema_version: Some("1.0.0"),
        ..RecordInfo::default()
    };
    let metadata = compose_metadata(&record, &tree);
    let migrated = MigrationEngine::default().apply_migrations(&tree, &metadata);

    let registry = ConverterRegistry::new();
    for format in ExportFormat::ALL {
        let options = ConversionOptions::new(format).with_metadata(migrated.metadata.clone());
        let result = registry.convert(&migrated.tree, &options);
        let _ = validator.validate_export_result(&result);
    }
});

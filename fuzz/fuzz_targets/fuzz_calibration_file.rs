#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let Ok(table) = data.parse::<toml::Table>() else {
        return;
    };
    if let Ok(file) = hand_config::CalibrationFile::from_table(table, &[1, 2, 3, 4]) {
        // what was accepted must encode again
        let _ = hand_config::limits_to_value(&file.motor_limits);
        let _ = hand_config::ratios_to_value(&file.ratios);
    }
});

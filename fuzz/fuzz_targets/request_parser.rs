#![no_main]

use libfuzzer_sys::fuzz_target;
use veracity::analyzer::{AnalysisRequest, TheaterPatternAnalyzer};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing must reject bad input with an error, never a panic
        if let Ok(request) = AnalysisRequest::from_json(input) {
            let _ = TheaterPatternAnalyzer::default().analyze(&request);
        }
    }
});

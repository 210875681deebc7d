#![no_main]

use libfuzzer_sys::fuzz_target;
use ntsyscall::{file::Image, PeImage, ResolverConfig};

fuzz_target!(|data: &[u8]| {
    let Ok(image) = Image::from_mem(data.to_vec()) else {
        return;
    };
    let Ok(pe) = PeImage::parse(image, &ResolverConfig::permissive()) else {
        return;
    };

    if let Ok(Some(exports)) = pe.exports() {
        for export in exports.iter().take(256) {
            let _ = export;
        }
        let _ = exports.resolve("NtClose");
    }
});

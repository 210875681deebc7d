#![no_main]

use libfuzzer_sys::fuzz_target;
use ntsyscall::{stub::decode_stub, ResolverConfig};

fuzz_target!(|data: &[u8]| {
    let _ = decode_stub(data, &ResolverConfig::permissive());
});

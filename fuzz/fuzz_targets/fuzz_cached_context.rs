#![no_main]

use libfuzzer_sys::fuzz_target;

use tenfold::cache::SessionContext;

fuzz_target!(|data: &[u8]| {
    // Cached contexts are written by this service but read back through
    // serde from Redis, where a partial write or an operator edit can leave
    // arbitrary bytes. Deserialization must reject bad input with an error,
    // never a panic.
    let _ = serde_json::from_slice::<SessionContext>(data);
});

#![no_main]

use gridwire::core::header::PacketHeader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Header decoding must never panic on arbitrary bytes, and every
    // successful decode must re-encode to a decodable header.
    if let Ok((header, len)) = PacketHeader::from_bytes(data) {
        assert!(len <= data.len());
        let bytes = header.to_bytes().expect("decoded header must re-encode");
        let (again, _) = PacketHeader::from_bytes(&bytes).expect("re-encoded header must decode");
        assert_eq!(again, header);
    }
});

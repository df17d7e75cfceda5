#![no_main]

use gridwire::core::header::Frequency;
use gridwire::core::registry::{MessageBody, TypeRegistry, TypeTag};
use gridwire::protocol::pipeline::PacketPipeline;
use gridwire::WireConfig;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

#[derive(Debug)]
struct RawBody(Vec<u8>);

impl MessageBody for RawBody {
    fn type_tag(&self) -> TypeTag {
        TypeTag("Raw")
    }

    fn to_bytes(&self) -> gridwire::Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

fn raw_decoder(bytes: &[u8]) -> gridwire::Result<Box<dyn MessageBody>> {
    Ok(Box::new(RawBody(bytes.to_vec())))
}

fuzz_target!(|data: &[u8]| {
    let mut builder = TypeRegistry::builder();
    builder
        .register(Frequency::Low, 9, TypeTag("ChatFromViewer"), raw_decoder)
        .unwrap();
    let pipeline = PacketPipeline::new(
        &WireConfig::default(),
        Arc::new(builder.build()),
        TypeTag("ChatFromViewer"),
    );

    // The whole inbound path is hostile-input territory: decoding any
    // datagram must drop or deliver, never panic.
    let _ = pipeline.decode_datagram(data);
});

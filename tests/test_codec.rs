use common::{get_engine, sod, sod_ic, CONFIG};
use mvmm_ale::{codec::ExtensiveCodec, mesh::Tessellation, HydroError};

mod common;

#[test]
fn test_engine_round_trip() {
    let mut engine = get_engine(CONFIG, sod(20), sod_ic);
    engine.advance().expect("Error advancing engine!");

    let codec = ExtensiveCodec::for_batch(engine.mesh().dimensionality(), engine.extensives());
    assert_eq!(codec.chunk_len(), 4);
    let buffer = codec.encode(engine.extensives());
    assert_eq!(buffer.len(), 20 * codec.chunk_len());
    let decoded = codec.decode(&buffer).expect("Error decoding batch!");
    assert_eq!(decoded, engine.extensives());

    match codec.decode(&buffer[1..]) {
        Err(HydroError::MalformedBatch {
            chunk_len,
            buffer_len,
            ..
        }) => {
            assert_eq!(chunk_len, 4);
            assert_eq!(buffer_len, 79);
        }
        other => panic!("Unexpected decoding result: {other:?}"),
    }
}

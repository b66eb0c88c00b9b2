use domain::{ByteOrder, DataType, RegisterConfig, RegisterRegion, WordOrder};
use mbus_codec::{
    DecodeError, Scaling, WordLayout, decode, decode_register, encode, encode_register,
};

fn holding(data_type: DataType, scale: f64, precision: u8) -> RegisterConfig {
    RegisterConfig {
        region: RegisterRegion::Holding,
        address: 0,
        name: "value".to_string(),
        description: String::new(),
        unit: String::new(),
        data_type,
        scale,
        offset: 0.0,
        precision,
        read_only: false,
        byte_order: None,
        word_order: None,
    }
}

#[test]
fn uint16_with_scale() {
    let register = holding(DataType::Uint16, 0.1, 2);
    let value = decode_register(&register, WordLayout::default(), &[250]).unwrap();
    assert_eq!(value, 25.0);
}

#[test]
fn int32_high_word_first() {
    let register = holding(DataType::Int32, 0.01, 2);
    let value = decode_register(&register, WordLayout::default(), &[0x0000, 0x03E8]).unwrap();
    assert_eq!(value, 10.0);
}

#[test]
fn negative_int32() {
    let value = decode(
        &[0xFFFF, 0xFFFE],
        DataType::Int32,
        Scaling::identity(0),
        WordLayout::default(),
    )
    .unwrap();
    assert_eq!(value, -2.0);
}

#[test]
fn offset_applied_after_scale() {
    let value = decode(
        &[1000],
        DataType::Uint16,
        Scaling::new(0.1, -40.0, 1),
        WordLayout::default(),
    )
    .unwrap();
    assert_eq!(value, 60.0);
}

#[test]
fn word_count_mismatch() {
    let err = decode(
        &[1],
        DataType::Float32,
        Scaling::identity(2),
        WordLayout::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        DecodeError::WordCount {
            data_type: "float32",
            expected: 2,
            actual: 1,
        }
    );
}

#[test]
fn encode_inverts_decode_for_integers() {
    let register = holding(DataType::Uint16, 0.1, 2);
    let words = encode_register(&register, WordLayout::default(), 25.0).unwrap();
    assert_eq!(words, vec![250]);

    let register = holding(DataType::Int32, 0.01, 2);
    let words = encode_register(&register, WordLayout::default(), -10.0).unwrap();
    assert_eq!(words, vec![0xFFFF, 0xFC18]);
    let back = decode_register(&register, WordLayout::default(), &words).unwrap();
    assert_eq!(back, -10.0);
}

#[test]
fn encode_honours_layout() {
    let layout = WordLayout::new(ByteOrder::Little, WordOrder::Little);
    let words = encode(
        0x0102_0304 as f64,
        DataType::Uint32,
        Scaling::identity(0),
        layout,
    )
    .unwrap();
    assert_eq!(words, vec![0x0403, 0x0201]);
    let back = decode(&words, DataType::Uint32, Scaling::identity(0), layout).unwrap();
    assert_eq!(back, 0x0102_0304 as f64);
}

#[test]
fn float32_rounded_to_precision() {
    // 1.1f32 展宽为 f64 后为 1.100000023841858
    let words = encode(1.1, DataType::Float32, Scaling::identity(2), WordLayout::default())
        .unwrap();
    let value = decode(
        &words,
        DataType::Float32,
        Scaling::identity(2),
        WordLayout::default(),
    )
    .unwrap();
    assert_eq!(value, 1.1);
}

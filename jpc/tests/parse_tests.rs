mod common;

use common::*;
use jpc::{
    parse_header, ByteStream, CommentRegistrationValue, DecodeError, DecoderConfig, HeaderError,
    MultipleComponentTransformation, NoopEvents, ProgressionOrder, QuantizationStyle,
    TransformationFilter, MARKER_SYMBOL_COC, MARKER_SYMBOL_CRG, MARKER_SYMBOL_QCD,
    MARKER_SYMBOL_SIZ,
};

fn parse(bytes: Vec<u8>) -> Result<(jpc::Header, jpc::TileGridInfo), DecodeError> {
    let mut stream = ByteStream::from_bytes(bytes);
    parse_header(&mut stream, &DecoderConfig::default(), &NoopEvents)
}

fn parse_with(bytes: Vec<u8>, config: DecoderConfig) -> Result<(jpc::Header, jpc::TileGridInfo), DecodeError> {
    let mut stream = ByteStream::from_bytes(bytes);
    parse_header(&mut stream, &config, &NoopEvents)
}

fn three_components() -> Vec<Component> {
    vec![
        Component {
            precision: 8,
            signed: false,
            dx: 1,
            dy: 1,
        },
        Component {
            precision: 12,
            signed: true,
            dx: 2,
            dy: 2,
        },
        Component {
            precision: 8,
            signed: false,
            dx: 2,
            dy: 1,
        },
    ]
}

#[test]
fn test_main_header() {
    let builder = CodestreamBuilder::new(300, 200, 256, 256).components(three_components());
    let bytes = builder.build();
    let first_sot = builder.main_header().len() as u64;

    let mut stream = ByteStream::from_bytes(bytes);
    let (header, grid) =
        parse_header(&mut stream, &DecoderConfig::default(), &NoopEvents).expect("header should parse");

    // Left at the first tile-part
    assert_eq!(stream.position().unwrap(), first_sot);
    assert_eq!(grid.first_tile_part_offset, first_sot);
    assert_eq!(grid.codestream_offset, 0);
    assert_eq!(grid.tiles_x, 2);
    assert_eq!(grid.tiles_y, 1);
    assert_eq!(grid.total_tiles(), 2);

    let siz = header.image_and_tile_size_marker_segment();
    assert_eq!(siz.offset(), 2);
    assert_eq!(siz.length(), 38 + 3 * 3);
    assert_eq!(siz.decoder_capabilities(), 0);
    assert_eq!(siz.reference_grid_width(), 300);
    assert_eq!(siz.reference_grid_height(), 200);
    assert_eq!(siz.no_components(), 3);
    assert_eq!(siz.precision(1), Some(12));
    assert_eq!(siz.values_are_signed(1), Some(true));
    assert_eq!(siz.horizontal_separation(2), Some(2));
    assert_eq!(siz.vertical_separation(2), Some(1));
    assert_eq!(siz.precision(3), None);

    assert_eq!(header.width(), 300);
    assert_eq!(header.height(), 200);
    assert_eq!(header.tile_width(), 256);
    assert_eq!(header.tile_height(), 256);
    assert_eq!(header.no_components(), 3);
    assert_eq!(header.component_width(0), Some(300));
    assert_eq!(header.component_height(0), Some(200));
    assert_eq!(header.component_width(1), Some(150));
    assert_eq!(header.component_height(1), Some(100));
    assert_eq!(header.component_width(2), Some(150));
    assert_eq!(header.component_height(2), Some(200));
    assert!(header.component(1).unwrap().signed);

    // COD
    let cod = header.coding_style_marker_segment();
    assert_eq!(cod.coding_style(), 0);
    assert!(!cod.uses_start_of_packet());
    assert!(!cod.uses_end_of_packet_header());
    assert_eq!(cod.progression_order(), ProgressionOrder::LRLCPP);
    assert_eq!(cod.no_layers(), 1);
    assert_eq!(
        cod.multiple_component_transformation(),
        MultipleComponentTransformation::None
    );
    let parameters = cod.coding_style_parameters();
    assert_eq!(parameters.no_decomposition_levels(), 0);
    assert_eq!(parameters.code_block_width(), 64);
    assert_eq!(parameters.code_block_height(), 64);
    assert_eq!(parameters.code_block_style(), 0);
    assert_eq!(parameters.transformation(), TransformationFilter::Reversible);
    assert!(!parameters.has_defined_precinct_size());
    let precincts = parameters.precinct_sizes();
    assert_eq!(precincts.len(), 1);
    assert_eq!(precincts[0].width_exponent(), 15);
    assert_eq!(precincts[0].height_exponent(), 15);

    // QCD
    let qcd = header.quantization_default_marker_segment();
    assert_eq!(qcd.quantization_style(), QuantizationStyle::No { guard: 2 });
    assert_eq!(qcd.quantization_exponents(), vec![9]);

    assert!(header.coding_style_component_segments().is_empty());
    assert!(header.quantization_component_segments().is_empty());
    assert!(header.skipped_segments().is_empty());
}

#[test]
fn test_codestream_offset() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64);
    let mut bytes = vec![0xAA; 10];
    bytes.extend(builder.build());

    let mut stream = ByteStream::from_bytes(bytes);
    stream.seek(10).unwrap();
    let (_, grid) = parse_header(&mut stream, &DecoderConfig::default(), &NoopEvents).unwrap();
    assert_eq!(grid.codestream_offset, 10);
    assert_eq!(grid.first_tile_part_offset, 10 + builder.main_header().len() as u64);
}

#[test]
fn test_optional_segments() {
    let mut comment = vec![0, 1];
    comment.extend(b"Kakadu-v8.0");
    let coc = [1, 0, 1, 3, 3, 0, 0];
    let qcc = [2, 0b0100_0010, 0x40, 0x00];
    let tlm = [0, 0b0101_0000, 0, 0, 0, 0, 40];

    let builder = CodestreamBuilder::new(300, 200, 256, 256)
        .components(three_components())
        .main_segment(COC, &coc)
        .main_segment(QCC, &qcc)
        .main_segment(TLM, &tlm)
        .main_segment(CRG, &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0])
        .main_segment(COM, &comment);

    let (header, _) = parse(builder.build()).expect("header should parse");

    let cocs = header.coding_style_component_segments();
    assert_eq!(cocs.len(), 1);
    assert_eq!(cocs[0].component_index(), 1);
    assert_eq!(cocs[0].coding_style_parameters().no_decomposition_levels(), 1);
    assert_eq!(cocs[0].coding_style_parameters().code_block_width(), 32);
    assert_eq!(
        cocs[0].coding_style_parameters().transformation(),
        TransformationFilter::Irreversible
    );

    // COC over COD for component 1 only
    assert_eq!(header.coding_style(1).no_decomposition_levels(), 1);
    assert_eq!(header.coding_style(0).no_decomposition_levels(), 0);

    let qccs = header.quantization_component_segments();
    assert_eq!(qccs.len(), 1);
    assert_eq!(qccs[0].component_index(), 2);
    assert_eq!(
        qccs[0].parameters().quantization_style(),
        QuantizationStyle::ScalarExpounded { guard: 2 }
    );
    assert_eq!(
        header.quantization(2).quantization_style(),
        QuantizationStyle::ScalarExpounded { guard: 2 }
    );
    assert_eq!(
        header.quantization(0).quantization_style(),
        QuantizationStyle::No { guard: 2 }
    );

    let tlms = header.tile_part_lengths_segments();
    assert_eq!(tlms.len(), 1);
    assert_eq!(tlms[0].tile_part_lengths().len(), 1);
    assert_eq!(tlms[0].tile_part_lengths()[0].tile_index, Some(0));
    assert_eq!(tlms[0].tile_part_lengths()[0].tile_length, 40);

    let skipped = header.skipped_segments();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].marker, MARKER_SYMBOL_CRG);
    assert_eq!(skipped[0].length, 14);

    let comments = header.comment_marker_segments();
    assert_eq!(comments.len(), 1);
    assert_eq!(
        comments[0].registration_value(),
        CommentRegistrationValue::Latin
    );
    assert_eq!(comments[0].comment_utf8().unwrap(), "Kakadu-v8.0");
}

#[test]
fn test_unknown_marker_skipped_with_warning() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64).main_segment([0xFF, 0x77], &[1, 2, 3]);
    let events = RecordingEvents::default();

    let mut stream = ByteStream::from_bytes(builder.build());
    let (header, grid) = parse_header(&mut stream, &DecoderConfig::default(), &events).unwrap();

    assert!(header.skipped_segments().is_empty());
    assert_eq!(grid.first_tile_part_offset, builder.main_header().len() as u64);
    let warnings = events.warnings.lock().unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("unknown marker"));
}

#[test]
fn test_missing_siz() {
    let mut bytes = SOC.to_vec();
    bytes.extend(segment(COD, &cod_payload(1)));

    match parse(bytes) {
        Err(DecodeError::MalformedHeader(HeaderError::MarkerUnexpected { marker, offset })) => {
            assert_eq!(marker, [0xFF, 0x52]);
            assert_eq!(offset, 2);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_truncated_after_soc() {
    match parse(SOC.to_vec()) {
        Err(DecodeError::MalformedHeader(HeaderError::Truncated { offset })) => {
            assert_eq!(offset, 2)
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_missing_soc() {
    let mut bytes = segment(SIZ, &CodestreamBuilder::new(8, 8, 8, 8).siz_payload());
    bytes.extend(EOC);
    assert!(matches!(
        parse(bytes),
        Err(DecodeError::MalformedHeader(HeaderError::MarkerUnexpected { .. }))
    ));
}

#[test]
fn test_truncated_before_first_tile_part() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64);
    assert!(matches!(
        parse(builder.main_header()),
        Err(DecodeError::MalformedHeader(HeaderError::Truncated { .. }))
    ));
}

#[test]
fn test_missing_qcd() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64).without_qcd();
    match parse(builder.build()) {
        Err(DecodeError::MalformedHeader(HeaderError::MarkerMissing { marker })) => {
            assert_eq!(marker, MARKER_SYMBOL_QCD)
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_missing_cod() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64).without_cod();
    assert!(matches!(
        parse(builder.build()),
        Err(DecodeError::MalformedHeader(HeaderError::MarkerMissing { .. }))
    ));
}

#[test]
fn test_segment_length_past_end() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64);
    let mut bytes = builder.main_header();
    bytes.extend([0xFF, 0x64, 0x01, 0x00, 0x00, 0x01]);

    match parse(bytes) {
        Err(DecodeError::MalformedHeader(HeaderError::SegmentLength {
            length, remaining, ..
        })) => {
            assert_eq!(length, 256);
            assert_eq!(remaining, 2);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_siz_shorter_than_its_fields() {
    let mut bytes = SOC.to_vec();
    bytes.extend(segment(SIZ, &[0; 20]));
    bytes.extend(EOC);

    match parse(bytes) {
        Err(DecodeError::MalformedHeader(HeaderError::SegmentTooShort { marker, offset })) => {
            assert_eq!(marker, MARKER_SYMBOL_SIZ);
            assert_eq!(offset, 2);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_empty_image() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64).offsets(64, 0, 0, 0);
    assert!(matches!(
        parse(builder.build()),
        Err(DecodeError::MalformedHeader(HeaderError::EmptyImage { .. }))
    ));
}

#[test]
fn test_zero_tile_size() {
    let builder = CodestreamBuilder::new(64, 64, 0, 64);
    assert!(matches!(
        parse(builder.main_header()),
        Err(DecodeError::MalformedHeader(HeaderError::EmptyTile { .. }))
    ));
}

#[test]
fn test_tile_grid_offset_overflow() {
    let builder = CodestreamBuilder::new(64, 64, 32, 32).offsets(4, 4, 8, 0);
    assert!(matches!(
        parse(builder.main_header()),
        Err(DecodeError::MalformedHeader(HeaderError::TileGridOffsetOverflow { .. }))
    ));
}

#[test]
fn test_first_tile_misses_image() {
    // XTsiz + XTOsiz <= XOsiz
    let builder = CodestreamBuilder::new(64, 64, 8, 8).offsets(16, 0, 8, 0);
    assert!(matches!(
        parse(builder.main_header()),
        Err(DecodeError::MalformedHeader(HeaderError::TileSizeOverflow { .. }))
    ));
}

#[test]
fn test_component_limit() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64).components(three_components());
    let config = DecoderConfig {
        max_components: 2,
        ..Default::default()
    };
    match parse_with(builder.build(), config) {
        Err(DecodeError::MalformedHeader(HeaderError::ComponentCount { count, max })) => {
            assert_eq!(count, 3);
            assert_eq!(max, 2);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_bit_depth_limit() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64).components(three_components());
    let config = DecoderConfig {
        max_bit_depth: 10,
        ..Default::default()
    };
    match parse_with(builder.build(), config) {
        Err(DecodeError::MalformedHeader(HeaderError::BitDepth {
            component, depth, ..
        })) => {
            assert_eq!(component, 1);
            assert_eq!(depth, 12);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_zero_subsampling() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64).components(vec![Component {
        precision: 8,
        signed: false,
        dx: 0,
        dy: 1,
    }]);
    assert!(matches!(
        parse(builder.main_header()),
        Err(DecodeError::MalformedHeader(HeaderError::Subsampling { component: 0 }))
    ));
}

#[test]
fn test_too_many_tiles() {
    let builder = CodestreamBuilder::new(1024, 1024, 1, 1);
    let config = DecoderConfig {
        max_image_samples: u64::MAX,
        ..Default::default()
    };
    match parse_with(builder.main_header(), config) {
        Err(DecodeError::MalformedHeader(HeaderError::TooManyTiles { count })) => {
            assert_eq!(count, 1024 * 1024)
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_image_too_large() {
    let builder = CodestreamBuilder::new(100, 100, 100, 100);
    let config = DecoderConfig {
        max_image_samples: 9999,
        ..Default::default()
    };
    match parse_with(builder.build(), config) {
        Err(DecodeError::MalformedHeader(HeaderError::ImageTooLarge { samples, max })) => {
            assert_eq!(samples, 10000);
            assert_eq!(max, 9999);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_coc_component_out_of_range() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64)
        .components(three_components())
        .main_segment(COC, &[5, 0, 0, 4, 4, 0, 1]);
    match parse(builder.build()) {
        Err(DecodeError::MalformedHeader(HeaderError::ComponentIndex {
            marker,
            component,
            no_components,
        })) => {
            assert_eq!(marker, MARKER_SYMBOL_COC);
            assert_eq!(component, 5);
            assert_eq!(no_components, 3);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_more_coc_than_components() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64)
        .main_segment(COC, &[0, 0, 0, 4, 4, 0, 1])
        .main_segment(COC, &[0, 0, 1, 4, 4, 0, 1]);
    assert!(matches!(
        parse(builder.build()),
        Err(DecodeError::MalformedHeader(HeaderError::MarkerError { .. }))
    ));
}

#[test]
fn test_repeated_coc_for_component() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64)
        .components(three_components())
        .main_segment(COC, &[1, 0, 0, 4, 4, 0, 1])
        .main_segment(COC, &[1, 0, 1, 4, 4, 0, 1]);
    match parse(builder.build()) {
        Err(DecodeError::MalformedHeader(HeaderError::MarkerError { marker, error })) => {
            assert_eq!(marker, MARKER_SYMBOL_COC);
            assert_eq!(error, "more than one segment for component 1");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_closed_stream_is_io_error() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64);
    let mut stream = ByteStream::from_bytes(builder.build());
    stream.close();
    assert!(matches!(
        parse_header(&mut stream, &DecoderConfig::default(), &NoopEvents),
        Err(DecodeError::Io(_))
    ));
}

#[test]
fn test_unexpected_marker_in_main_header() {
    let builder = CodestreamBuilder::new(64, 64, 64, 64);
    let mut bytes = builder.main_header();
    bytes.extend(SOD);
    bytes.extend(EOC);
    assert!(matches!(
        parse(bytes),
        Err(DecodeError::MalformedHeader(HeaderError::MarkerUnexpected { .. }))
    ));
}

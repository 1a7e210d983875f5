//! Tests for the ATT codec and attribute database

use super::*;
use crate::uuid::Uuid;
use rand::Rng;

#[test]
fn test_error_response_layout() {
    let bytes = [0x01, 0x12, 0x25, 0x00, 0x03];
    let pdu = AttPdu::decode(&bytes, ATT_MIN_MTU).unwrap();

    match &pdu {
        AttPdu::ErrorResponse(err) => {
            assert_eq!(err.request_opcode, ATT_WRITE_REQ);
            assert_eq!(err.handle, 0x0025);
            assert_eq!(err.error_code, AttErrorCode::WriteNotPermitted);
        }
        other => panic!("unexpected PDU {:?}", other),
    }
    assert_eq!(pdu.encode(), bytes.to_vec());
    assert_eq!(pdu.class(), OpcodeClass::Response);
    assert!(pdu.answers(ATT_WRITE_REQ));
    assert!(!pdu.answers(ATT_READ_REQ));
    assert!(pdu.is_reply());

    let not_found = ErrorResponse::new(ATT_READ_BY_TYPE_REQ, 0x0010, AttErrorCode::AttributeNotFound);
    assert!(not_found.is_attribute_not_found());
    assert!(!AttPdu::ReadRequest(ReadRequest { handle: 3 }).is_reply());
    assert!(AttPdu::HandleValueConfirmation(HandleValueConfirmation).is_reply());
    assert!(!AttPdu::HandleValueIndication(HandleValueIndication { handle: 3, value: vec![] }).is_reply());
}

#[test]
fn test_error_code_bytes() {
    for code in 0x01..=0x13u8 {
        let parsed = AttErrorCode::from(code);
        assert!(!matches!(parsed, AttErrorCode::Unknown(_)), "0x{:02x}", code);
        assert_eq!(u8::from(parsed), code);
    }
    assert_eq!(AttErrorCode::from(0x0E), AttErrorCode::Unlikely);
    assert_eq!(AttErrorCode::from(0x85), AttErrorCode::ApplicationError(0x85));
    assert_eq!(AttErrorCode::from(0xFE), AttErrorCode::CommonProfileError(0xFE));
    assert_eq!(AttErrorCode::from(0x00), AttErrorCode::Unknown(0x00));
    assert_eq!(u8::from(AttErrorCode::Unknown(0x42)), 0x42);
}

#[test]
fn test_exchange_mtu_encoding() {
    let req = ExchangeMtuRequest { client_mtu: 512 };
    assert_eq!(req.serialize(), vec![0x02, 0x00, 0x02]);

    let rsp = ExchangeMtuResponse::parse(&[0x03, 0xB9, 0x00]).unwrap();
    assert_eq!(rsp.server_mtu, 185);
}

#[test]
fn test_truncated_pdus_are_malformed() {
    assert!(matches!(AttPdu::decode(&[], 23), Err(AttError::EmptyPdu)));
    assert!(matches!(
        AttPdu::decode(&[0x01, 0x12, 0x25], 23),
        Err(AttError::MalformedPdu { opcode: 0x01, .. })
    ));
    assert!(matches!(
        AttPdu::decode(&[0x0A, 0x01], 23),
        Err(AttError::MalformedPdu { opcode: 0x0A, .. })
    ));
    assert!(matches!(
        AttPdu::decode(&[0x1B, 0x01], 23),
        Err(AttError::MalformedPdu { opcode: 0x1B, .. })
    ));
}

#[test]
fn test_pdu_longer_than_mtu_is_rejected() {
    let mut bytes = vec![ATT_HANDLE_VALUE_NTF, 0x10, 0x00];
    bytes.extend_from_slice(&[0xAA; 21]);

    assert!(matches!(
        AttPdu::decode(&bytes, 23),
        Err(AttError::ExceedsMtu { len: 24, mtu: 23 })
    ));
    assert!(AttPdu::decode(&bytes, 24).is_ok());
}

#[test]
fn test_read_by_group_type_response() {
    // Two 16-bit services: 0x0001..0x0005 (0x1800) and 0x0006..0x0009 (0x180F)
    let bytes = [
        0x11, 0x06, 0x01, 0x00, 0x05, 0x00, 0x00, 0x18, 0x06, 0x00, 0x09, 0x00, 0x0F, 0x18,
    ];
    let rsp = ReadByGroupTypeResponse::parse(&bytes).unwrap();

    assert_eq!(rsp.data.len(), 2);
    assert_eq!(rsp.data[0].handle, 0x0001);
    assert_eq!(rsp.data[0].end_group_handle, 0x0005);
    assert_eq!(rsp.data[0].value, vec![0x00, 0x18]);
    assert_eq!(rsp.data[1].handle, 0x0006);
    assert_eq!(rsp.data[1].end_group_handle, 0x0009);
    assert_eq!(rsp.serialize(), bytes.to_vec());

    // Entry length that does not divide the data
    assert!(ReadByGroupTypeResponse::parse(&[0x11, 0x06, 0x01, 0x00, 0x05]).is_err());
}

#[test]
fn test_read_by_type_with_128bit_uuid() {
    let vendor = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
    let req = ReadByTypeRequest { start_handle: 1, end_handle: 0xFFFF, attribute_type: vendor };
    let bytes = req.serialize();

    assert_eq!(bytes.len(), 21);
    assert_eq!(&bytes[5..], vendor.as_bytes_le());
    assert_eq!(ReadByTypeRequest::parse(&bytes).unwrap(), req);

    let short = ReadByTypeRequest {
        start_handle: 1,
        end_handle: 0xFFFF,
        attribute_type: Uuid::from_u16(CHARACTERISTIC_UUID),
    };
    assert_eq!(short.serialize(), vec![0x08, 0x01, 0x00, 0xFF, 0xFF, 0x03, 0x28]);

    // A 3-byte UUID is neither form
    assert!(ReadByTypeRequest::parse(&[0x08, 0x01, 0x00, 0xFF, 0xFF, 0x03, 0x28, 0x00]).is_err());
}

#[test]
fn test_empty_discovery_response_is_not_an_error() {
    let rsp = ReadByTypeResponse::parse(&[0x09, 0x00]).unwrap();
    assert!(rsp.data.is_empty());

    let rsp = FindInformationResponse::parse(&[0x05, 0x01]).unwrap();
    assert!(rsp.information_data.is_empty());
}

#[test]
fn test_find_information_formats() {
    let rsp = FindInformationResponse::parse(&[0x05, 0x01, 0x04, 0x00, 0x02, 0x29]).unwrap();
    assert_eq!(rsp.information_data.len(), 1);
    assert_eq!(rsp.information_data[0].handle, 0x0004);
    assert_eq!(rsp.information_data[0].uuid, CLIENT_CHAR_CONFIG_UUID);

    let mut long = vec![0x05, 0x02, 0x07, 0x00];
    long.extend((0u8..16).collect::<Vec<u8>>());
    let rsp = FindInformationResponse::parse(&long).unwrap();
    assert_eq!(rsp.information_data[0].uuid.to_att_bytes(), (0u8..16).collect::<Vec<u8>>());
    assert_eq!(rsp.serialize(), long);

    assert!(FindInformationResponse::parse(&[0x05, 0x03, 0x04, 0x00, 0x02, 0x29]).is_err());
}

#[test]
fn test_prepare_write_echo() {
    let req = PrepareWriteRequest { handle: 0x0021, offset: 18, value: vec![1, 2, 3] };
    let bytes = req.serialize();
    assert_eq!(bytes, vec![0x16, 0x21, 0x00, 0x12, 0x00, 1, 2, 3]);

    let mut echo_bytes = bytes.clone();
    echo_bytes[0] = ATT_PREPARE_WRITE_RSP;
    let echo = PrepareWriteResponse::parse(&echo_bytes).unwrap();
    assert!(echo.echoes(&req));

    let altered = PrepareWriteResponse { value: vec![1, 2, 4], ..echo };
    assert!(!altered.echoes(&req));
}

#[test]
fn test_opcode_classes() {
    assert_eq!(OpcodeClass::of(ATT_READ_REQ), OpcodeClass::Request);
    assert_eq!(OpcodeClass::of(ATT_READ_RSP), OpcodeClass::Response);
    assert_eq!(OpcodeClass::of(ATT_WRITE_CMD), OpcodeClass::Command);
    assert_eq!(OpcodeClass::of(ATT_SIGNED_WRITE_CMD), OpcodeClass::Command);
    assert_eq!(OpcodeClass::of(ATT_HANDLE_VALUE_NTF), OpcodeClass::Notification);
    assert_eq!(OpcodeClass::of(ATT_HANDLE_VALUE_IND), OpcodeClass::Indication);
    assert_eq!(OpcodeClass::of(ATT_HANDLE_VALUE_CONF), OpcodeClass::Confirmation);
    // Unassigned opcode without the command bit
    assert_eq!(OpcodeClass::of(0x20), OpcodeClass::Request);

    assert_eq!(response_opcode(ATT_READ_BLOB_REQ), Some(ATT_READ_BLOB_RSP));
    assert_eq!(response_opcode(ATT_WRITE_CMD), None);
}

#[test]
fn test_unknown_opcode_is_preserved() {
    let bytes = [0xD2, 0x10, 0x00, 0xAA];
    let pdu = AttPdu::decode(&bytes, 23).unwrap();
    assert_eq!(pdu, AttPdu::Unknown { opcode: 0xD2, parameters: vec![0x10, 0x00, 0xAA] });
    assert_eq!(pdu.encode(), bytes.to_vec());
}

#[test]
fn test_execute_write_flags() {
    assert_eq!(ExecuteWriteRequest { flags: ATT_EXEC_WRITE_COMMIT }.serialize(), vec![0x18, 0x01]);
    assert!(ExecuteWriteRequest::parse(&[0x18, 0x02]).is_err());
}

fn sample_database() -> AttributeDatabase {
    let db = AttributeDatabase::new();
    let ro = AttPermissions::read_only();

    // Service 0x1800: handles 1..=3
    db.add_attribute_with_next_handle(Uuid::from_u16(PRIMARY_SERVICE_UUID), vec![0x00, 0x18], ro).unwrap();
    db.add_attribute_with_next_handle(Uuid::from_u16(CHARACTERISTIC_UUID), vec![0x02, 0x03, 0x00, 0x00, 0x2A], ro)
        .unwrap();
    db.add_attribute_with_next_handle(Uuid::from_u16(DEVICE_NAME_UUID), b"dev".to_vec(), ro).unwrap();

    // Service 0x180F: handles 4..=7
    db.add_attribute_with_next_handle(Uuid::from_u16(PRIMARY_SERVICE_UUID), vec![0x0F, 0x18], ro).unwrap();
    db.add_attribute_with_next_handle(Uuid::from_u16(CHARACTERISTIC_UUID), vec![0x12, 0x06, 0x00, 0x19, 0x2A], ro)
        .unwrap();
    db.add_attribute_with_next_handle(Uuid::from_u16(0x2A19), vec![87], AttPermissions::READ_ENCRYPTED | ro)
        .unwrap();
    db.add_attribute_with_next_handle(
        Uuid::from_u16(CLIENT_CHAR_CONFIG_UUID),
        vec![0, 0],
        AttPermissions::read_write(),
    )
    .unwrap();
    db
}

#[test]
fn test_database_group_ranges() {
    let db = sample_database();
    let groups = db
        .read_by_group_type(1, 0xFFFF, &Uuid::from_u16(PRIMARY_SERVICE_UUID), SecurityLevel::None)
        .unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!((groups[0].0, groups[0].1), (1, 3));
    assert_eq!((groups[1].0, groups[1].1), (4, 7));

    let err = db
        .read_by_group_type(8, 0xFFFF, &Uuid::from_u16(PRIMARY_SERVICE_UUID), SecurityLevel::None)
        .unwrap_err();
    assert_eq!(err.to_error_code(), AttErrorCode::AttributeNotFound);
    assert_eq!(err.handle(), Some(8));

    let err = db
        .read_by_group_type(1, 0xFFFF, &Uuid::from_u16(CHARACTERISTIC_UUID), SecurityLevel::None)
        .unwrap_err();
    assert_eq!(err.to_error_code(), AttErrorCode::UnsupportedGroupType);

    let found = db
        .find_by_type_value(1, 0xFFFF, &Uuid::from_u16(PRIMARY_SERVICE_UUID), &[0x0F, 0x18], SecurityLevel::None)
        .unwrap();
    assert_eq!(found, vec![(4, 7)]);
}

#[test]
fn test_database_permissions() {
    let db = sample_database();

    let err = db.read_by_handle(6, SecurityLevel::None).unwrap_err();
    assert_eq!(err.to_error_code(), AttErrorCode::InsufficientEncryption);
    assert_eq!(db.read_by_handle(6, SecurityLevel::EncryptionOnly).unwrap(), vec![87]);

    let err = db.write_by_handle(3, b"x", SecurityLevel::None).unwrap_err();
    assert_eq!(err.to_error_code(), AttErrorCode::WriteNotPermitted);
    assert_eq!(err.handle(), Some(3));

    db.write_by_handle(7, &[1, 0], SecurityLevel::None).unwrap();
    assert_eq!(db.get_attribute(7).unwrap().value, vec![1, 0]);

    let err = db.read_by_handle(0x0100, SecurityLevel::None).unwrap_err();
    assert_eq!(err.to_error_code(), AttErrorCode::InvalidHandle);
}

#[test]
fn test_database_read_by_type_stops_at_unreadable() {
    let db = sample_database();
    let decls = db
        .read_by_type(1, 0xFFFF, &Uuid::from_u16(CHARACTERISTIC_UUID), SecurityLevel::None)
        .unwrap();
    assert_eq!(decls.iter().map(|(h, _)| *h).collect::<Vec<_>>(), vec![2, 5]);

    let err = db
        .read_by_type(1, 0xFFFF, &Uuid::from_u16(0x2A19), SecurityLevel::None)
        .unwrap_err();
    assert_eq!(err.to_error_code(), AttErrorCode::InsufficientEncryption);
}

#[test]
fn test_find_information_range() {
    let db = sample_database();
    let info = db.find_information(6, 7).unwrap();
    assert_eq!(info, vec![(6, Uuid::from_u16(0x2A19)), (7, Uuid::from_u16(CLIENT_CHAR_CONFIG_UUID))]);

    assert!(db.find_information(7, 6).is_err());
    assert!(db.find_information(8, 0xFFFF).is_err());
}

/// One PDU of every kind, with random handles and values
fn every_pdu(rng: &mut impl Rng) -> Vec<AttPdu> {
    let short = Uuid::from_u16(rng.gen());
    let long: Uuid = "6e400002-b5a3-f393-e0a9-e50e24dcca9e".parse().unwrap();
    let entry_len = rng.gen_range(0..=64);
    let value: Vec<u8> = (0..entry_len).map(|_| rng.gen()).collect();

    vec![
        AttPdu::ErrorResponse(ErrorResponse::new(ATT_READ_REQ, rng.gen(), AttErrorCode::AttributeNotLong)),
        AttPdu::ErrorResponse(ErrorResponse::new(ATT_WRITE_REQ, 0, AttErrorCode::ApplicationError(0x80))),
        AttPdu::ErrorResponse(ErrorResponse::new(ATT_WRITE_REQ, 0, AttErrorCode::CommonProfileError(0xFD))),
        AttPdu::ExchangeMtuRequest(ExchangeMtuRequest { client_mtu: rng.gen() }),
        AttPdu::ExchangeMtuResponse(ExchangeMtuResponse { server_mtu: rng.gen() }),
        AttPdu::FindInformationRequest(FindInformationRequest { start_handle: 1, end_handle: rng.gen() }),
        AttPdu::FindInformationResponse(FindInformationResponse {
            format: ATT_FIND_INFO_RSP_FORMAT_16BIT,
            information_data: vec![HandleUuid { handle: 1, uuid: short }, HandleUuid { handle: 2, uuid: short }],
        }),
        AttPdu::FindInformationResponse(FindInformationResponse {
            format: ATT_FIND_INFO_RSP_FORMAT_128BIT,
            information_data: vec![HandleUuid { handle: rng.gen(), uuid: long }],
        }),
        AttPdu::FindInformationResponse(FindInformationResponse {
            format: ATT_FIND_INFO_RSP_FORMAT_16BIT,
            information_data: Vec::new(),
        }),
        AttPdu::FindByTypeValueRequest(FindByTypeValueRequest {
            start_handle: 1,
            end_handle: 0xFFFF,
            attribute_type: 0x2800,
            attribute_value: long.to_att_bytes(),
        }),
        AttPdu::FindByTypeValueResponse(FindByTypeValueResponse {
            handles: vec![HandleRange { found_handle: rng.gen(), group_end_handle: rng.gen() }],
        }),
        AttPdu::FindByTypeValueResponse(FindByTypeValueResponse { handles: Vec::new() }),
        AttPdu::ReadByTypeRequest(ReadByTypeRequest { start_handle: 1, end_handle: 0xFFFF, attribute_type: short }),
        AttPdu::ReadByTypeRequest(ReadByTypeRequest { start_handle: 1, end_handle: 0xFFFF, attribute_type: long }),
        AttPdu::ReadByTypeResponse(ReadByTypeResponse {
            data: vec![
                HandleValue { handle: rng.gen(), value: vec![1; entry_len] },
                HandleValue { handle: rng.gen(), value: value.clone() },
            ],
        }),
        AttPdu::ReadByTypeResponse(ReadByTypeResponse { data: Vec::new() }),
        AttPdu::ReadRequest(ReadRequest { handle: rng.gen() }),
        AttPdu::ReadResponse(ReadResponse { value: value.clone() }),
        AttPdu::ReadBlobRequest(ReadBlobRequest { handle: rng.gen(), offset: rng.gen() }),
        AttPdu::ReadBlobResponse(ReadBlobResponse { value: value.clone() }),
        AttPdu::ReadMultipleRequest(ReadMultipleRequest { handles: vec![rng.gen(), rng.gen(), rng.gen()] }),
        AttPdu::ReadMultipleResponse(ReadMultipleResponse { values: value.clone() }),
        AttPdu::ReadByGroupTypeRequest(ReadByGroupTypeRequest {
            start_handle: 1,
            end_handle: 0xFFFF,
            group_type: short,
        }),
        AttPdu::ReadByGroupTypeRequest(ReadByGroupTypeRequest {
            start_handle: 1,
            end_handle: 0xFFFF,
            group_type: long,
        }),
        AttPdu::ReadByGroupTypeResponse(ReadByGroupTypeResponse {
            data: vec![
                AttributeData { handle: 1, end_group_handle: 5, value: short.to_att_bytes() },
                AttributeData { handle: 6, end_group_handle: 9, value: short.to_att_bytes() },
            ],
        }),
        AttPdu::ReadByGroupTypeResponse(ReadByGroupTypeResponse {
            data: vec![AttributeData { handle: 10, end_group_handle: 0xFFFF, value: long.to_att_bytes() }],
        }),
        AttPdu::ReadByGroupTypeResponse(ReadByGroupTypeResponse { data: Vec::new() }),
        AttPdu::WriteRequest(WriteRequest { handle: rng.gen(), value: value.clone() }),
        AttPdu::WriteResponse(WriteResponse),
        AttPdu::WriteCommand(WriteCommand { handle: rng.gen(), value: value.clone() }),
        AttPdu::PrepareWriteRequest(PrepareWriteRequest { handle: rng.gen(), offset: rng.gen(), value: value.clone() }),
        AttPdu::PrepareWriteResponse(PrepareWriteResponse {
            handle: rng.gen(),
            offset: rng.gen(),
            value: value.clone(),
        }),
        AttPdu::ExecuteWriteRequest(ExecuteWriteRequest { flags: ATT_EXEC_WRITE_CANCEL }),
        AttPdu::ExecuteWriteRequest(ExecuteWriteRequest { flags: ATT_EXEC_WRITE_COMMIT }),
        AttPdu::ExecuteWriteResponse(ExecuteWriteResponse),
        AttPdu::HandleValueNotification(HandleValueNotification { handle: rng.gen(), value: value.clone() }),
        AttPdu::HandleValueIndication(HandleValueIndication { handle: rng.gen(), value }),
        AttPdu::HandleValueConfirmation(HandleValueConfirmation),
        AttPdu::Unknown { opcode: ATT_SIGNED_WRITE_CMD, parameters: vec![0x03, 0x00, 0xAA, 0xBB] },
        AttPdu::Unknown { opcode: 0x3F, parameters: Vec::new() },
    ]
}

#[test]
fn test_every_pdu_survives_the_codec() {
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        for pdu in every_pdu(&mut rng) {
            let bytes = pdu.encode();
            assert_eq!(bytes[0], pdu.opcode());
            assert_eq!(AttPdu::decode(&bytes, ATT_MAX_MTU).unwrap(), pdu, "bytes {:02x?}", bytes);
        }
    }
}

// tests/encoding_tests.rs

use pretty_assertions::assert_eq;

use netqasm::{lang, AppId, Flavour, Instr, NetQasmError, Subroutine};

const HEADER_LEN: usize = 4;
const COMMAND_LEN: usize = 7;

fn assemble(source: &str) -> Result<Subroutine, NetQasmError> {
    lang::parse(source)?.finalize(&Flavour::vanilla())
}

#[test]
fn test_header_carries_version_and_app_id() -> Result<(), Box<dyn std::error::Error>> {
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 258\n\
         set R0 0\n",
    )?;
    let bytes = subroutine.to_bytes();
    assert_eq!(bytes.len(), HEADER_LEN + COMMAND_LEN);
    // Version major/minor, then the application id in little endian.
    assert_eq!(&bytes[..HEADER_LEN], &[0, 0, 2, 1]);
    Ok(())
}

#[test]
fn test_round_trip_preserves_every_instruction() -> Result<(), Box<dyn std::error::Error>> {
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 1\n\
         array 4 @2\n\
         set R0 -3\n\
         store R0 @2[1]\n\
         set Q0 0\n\
         qalloc Q0\n\
         init Q0\n\
         rot_z Q0 3 2\n\
         meas Q0 M0\n\
         bnz M0 5\n\
         wait_all @2[0:4]\n\
         lea R1 @2\n\
         ret_arr @2\n\
         qfree Q0\n",
    )?;

    let decoded = Subroutine::from_bytes(&subroutine.to_bytes(), &Flavour::vanilla())?;
    assert_eq!(decoded.app_id, AppId(1));
    assert_eq!(decoded.instrs, subroutine.instrs);
    Ok(())
}

#[test]
fn test_opcode_id_meaning_depends_on_flavour() -> Result<(), Box<dyn std::error::Error>> {
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         cnot Q0 Q1\n",
    )?;
    let bytes = subroutine.to_bytes();

    let vanilla = Subroutine::from_bytes(&bytes, &Flavour::vanilla())?;
    assert!(matches!(vanilla.instrs[0], Instr::Cnot { .. }));

    // The NV flavour assigns the same wire id to its conditional rotation.
    let nv = Subroutine::from_bytes(&bytes, &Flavour::nv())?;
    assert!(matches!(nv.instrs[0], Instr::CrotX { .. }));
    Ok(())
}

#[test]
fn test_nv_rejects_ids_outside_its_set() -> Result<(), Box<dyn std::error::Error>> {
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         t Q0\n",
    )?;
    let result = Subroutine::from_bytes(&subroutine.to_bytes(), &Flavour::nv());
    assert!(matches!(result, Err(NetQasmError::Encoding { .. })));
    Ok(())
}

#[test]
fn test_unknown_opcode_id_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         set R0 0\n",
    )?;
    let mut bytes = subroutine.to_bytes();
    bytes[HEADER_LEN] = 200;
    let result = Subroutine::from_bytes(&bytes, &Flavour::vanilla());
    assert!(matches!(result, Err(NetQasmError::Encoding { .. })));
    Ok(())
}

#[test]
fn test_truncated_command_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         set R0 0\n",
    )?;
    let mut bytes = subroutine.to_bytes();
    bytes.pop();
    let result = Subroutine::from_bytes(&bytes, &Flavour::vanilla());
    assert!(matches!(result, Err(NetQasmError::Encoding { .. })));
    Ok(())
}

#[test]
fn test_nonzero_padding_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         set R0 0\n\
         set R1 1\n",
    )?;
    let mut bytes = subroutine.to_bytes();
    // `set` uses six command bytes; the seventh must stay zero.
    let padding = HEADER_LEN + COMMAND_LEN - 1;
    bytes[padding] = 0xff;
    let result = Subroutine::from_bytes(&bytes, &Flavour::vanilla());
    assert!(matches!(result, Err(NetQasmError::Encoding { .. })));
    Ok(())
}

// tests/lang_tests.rs

use pretty_assertions::assert_eq;

use netqasm::{lang, Flavour, NetQasmError};

#[test]
fn test_parse_program_with_macros_and_comments() -> Result<(), Box<dyn std::error::Error>> {
    let source = "\
        # NETQASM 0.0\n\
        # APPID 3\n\
        # DEFINE op h\n\
        # DEFINE q Q5\n\
        /* prepare and measure\n\
           a single qubit */\n\
        set $q 0 // virtual id\n\
        qalloc $q\n\
        init $q\n\
        $op $q // this is now a Hadamard\n\
        meas $q M0\n\
        qfree $q\n\
        ret_reg M0\n";

    let pre = lang::parse(source)?;
    assert_eq!(pre.app_id.0, 3);
    assert_eq!(pre.command_count(), 7);

    let subroutine = pre.finalize(&Flavour::vanilla())?;
    let rendered = subroutine.to_string();
    println!("Assembled:\n{rendered}");
    assert!(rendered.contains("h Q5"), "Macros should expand before parsing");
    Ok(())
}

#[test]
fn test_braced_define_spans_tokens() -> Result<(), Box<dyn std::error::Error>> {
    let source = "\
        # NETQASM 0.0\n\
        # APPID 0\n\
        # DEFINE flip {x Q0}\n\
        set Q0 0\n\
        qalloc Q0\n\
        init Q0\n\
        $flip\n\
        qfree Q0\n";

    let pre = lang::parse(source)?;
    assert_eq!(pre.command_count(), 5);
    Ok(())
}

#[test]
fn test_symbolic_branches_resolve() -> Result<(), Box<dyn std::error::Error>> {
    let source = "\
        # NETQASM 0.0\n\
        # APPID 0\n\
        set R0 0\n\
        AGAIN:\n\
        add R0 R0 R0\n\
        bez R0 AGAIN\n";

    // Labels survive parsing and only become indices at finalization.
    let pre = lang::parse(source)?;
    let rendered = pre.to_string();
    assert!(rendered.contains("AGAIN:"), "Parsed form should keep the label");

    let subroutine = pre.finalize(&Flavour::vanilla())?;
    let rendered = subroutine.to_string();
    assert!(rendered.contains("bez R0 1"), "Finalized form should use the index");
    Ok(())
}

#[test]
fn test_integer_array_index_gets_a_register() -> Result<(), Box<dyn std::error::Error>> {
    let source = "\
        # NETQASM 0.0\n\
        # APPID 0\n\
        array 4 @0\n\
        set R0 9\n\
        store R0 @0[2]\n";

    let pre = lang::parse(source)?;
    // The literal index becomes `set <fresh> 2` ahead of the store.
    assert_eq!(pre.command_count(), 4);
    let rendered = pre.to_string();
    assert!(rendered.contains("set R1 2"), "R0 is taken, so the index lands in R1");
    Ok(())
}

#[test]
fn test_syntax_error_reports_line() {
    let source = "\
        # NETQASM 0.0\n\
        # APPID 0\n\
        set R0 0\n\
        frobnicate R0\n";

    match lang::parse(source) {
        Err(NetQasmError::Encoding { message }) => {
            assert!(message.contains("line 4"), "got: {message}");
            assert!(message.contains("frobnicate"), "got: {message}");
        }
        other => panic!("expected an encoding error, got {other:?}"),
    }
}

#[test]
fn test_version_mismatch_is_rejected() {
    let source = "\
        # NETQASM 1.0\n\
        # APPID 0\n\
        set R0 0\n";

    assert!(matches!(
        lang::parse(source),
        Err(NetQasmError::Encoding { .. }),
    ));
}

#[test]
fn test_unterminated_block_comment_is_rejected() {
    let source = "\
        # NETQASM 0.0\n\
        # APPID 0\n\
        set R0 0 /* runs off the end\n";

    assert!(matches!(
        lang::parse(source),
        Err(NetQasmError::Encoding { .. }),
    ));
}

#[test]
fn test_print_then_reparse_is_stable() -> Result<(), Box<dyn std::error::Error>> {
    let source = "\
        # NETQASM 0.0\n\
        # APPID 2\n\
        array 2 @7\n\
        set R0 1\n\
        store R0 @7[0]\n\
        LOOP:\n\
        load R1 @7[0]\n\
        bnz R1 END\n\
        jmp LOOP\n\
        END:\n\
        ret_arr @7\n";

    let first = lang::parse(source)?;
    let second = lang::parse(&first.to_string())?;
    let flavour = Flavour::vanilla();
    assert_eq!(
        first.finalize(&flavour)?.to_bytes(),
        second.finalize(&flavour)?.to_bytes(),
        "Printing and reparsing must preserve the assembled program",
    );
    Ok(())
}

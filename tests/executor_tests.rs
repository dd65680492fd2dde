// tests/executor_tests.rs

use netqasm::{lang, Executor, Flavour, NetQasmError, SimProcessor, Subroutine};

// Helper: parse and assemble a vanilla-flavour text program.
fn assemble(source: &str) -> Result<Subroutine, NetQasmError> {
    lang::parse(source)?.finalize(&Flavour::vanilla())
}

#[test]
fn test_classical_loop() -> Result<(), Box<dyn std::error::Error>> {
    // Counts from 0 up to (but not including) 5 in R0.
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         set R0 0\n\
         set R1 5\n\
         LOOP:\n\
         beq R0 R1 DONE\n\
         add R0 R0 1\n\
         jmp LOOP\n\
         DONE:\n\
         ret_reg R0\n",
    )?;
    println!("Program:\n{subroutine}");

    let output = Executor::new(SimProcessor::new(0)).run(&subroutine)?;
    assert_eq!(output.register("R0"), Some(5), "Counter should reach 5");
    Ok(())
}

#[test]
fn test_conditional_correction() -> Result<(), Box<dyn std::error::Error>> {
    // Flip Q0, measure it, and copy the (deterministic) outcome onto a
    // second qubit only when it came out 1.
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         set Q0 0\n\
         set Q1 1\n\
         qalloc Q0\n\
         init Q0\n\
         qalloc Q1\n\
         init Q1\n\
         x Q0\n\
         meas Q0 M0\n\
         bez M0 SKIP\n\
         x Q1\n\
         SKIP:\n\
         meas Q1 M1\n\
         ret_reg M0\n\
         ret_reg M1\n\
         qfree Q0\n\
         qfree Q1\n",
    )?;

    let output = Executor::new(SimProcessor::new(7)).run(&subroutine)?;
    assert_eq!(output.register("M0"), Some(1), "Flipped qubit should measure 1");
    assert_eq!(output.register("M1"), Some(1), "Correction branch should have run");
    Ok(())
}

#[test]
fn test_array_store_load_return() -> Result<(), Box<dyn std::error::Error>> {
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         array 3 @0\n\
         set R0 42\n\
         store R0 @0[1]\n\
         load R1 @0[1]\n\
         ret_reg R1\n\
         ret_arr @0\n",
    )?;

    let output = Executor::new(SimProcessor::new(0)).run(&subroutine)?;
    assert_eq!(output.register("R1"), Some(42));
    let array = output.arrays.values().next().expect("one returned array");
    assert_eq!(array, &vec![None, Some(42), None], "Only slot 1 should be filled");
    Ok(())
}

#[test]
fn test_array_index_out_of_bounds() -> Result<(), Box<dyn std::error::Error>> {
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         array 2 @0\n\
         set R0 0\n\
         store R0 @0[5]\n",
    )?;

    let result = Executor::new(SimProcessor::new(0)).run(&subroutine);
    match result {
        Err(NetQasmError::Address { pc, .. }) => {
            // Assembled stream: set size, array, set R0, set index, store.
            assert_eq!(pc, 4, "Fault should be attributed to the store");
        }
        other => panic!("expected an address error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_load_of_unfilled_slot() -> Result<(), Box<dyn std::error::Error>> {
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         array 2 @0\n\
         load R0 @0[0]\n",
    )?;

    let result = Executor::new(SimProcessor::new(0)).run(&subroutine);
    assert!(
        matches!(result, Err(NetQasmError::NotYetAvailable { .. })),
        "Reading an undefined slot must not silently produce a value",
    );
    Ok(())
}

#[test]
fn test_execution_error_carries_host_line() -> Result<(), Box<dyn std::error::Error>> {
    // Line 4 of the document frees a qubit that was never allocated.
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         set Q0 0\n\
         qfree Q0\n",
    )?;

    let result = Executor::new(SimProcessor::new(0)).run(&subroutine);
    match result {
        Err(NetQasmError::Execution { pc, host_line, .. }) => {
            assert_eq!(pc, 1);
            assert_eq!(host_line.map(|l| l.0), Some(4), "Debug map should point at the qfree");
        }
        other => panic!("expected an execution error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_modular_arithmetic() -> Result<(), Box<dyn std::error::Error>> {
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         set R0 7\n\
         set R1 8\n\
         set R2 2\n\
         addm R3 R0 R1 R2\n\
         subm R4 R0 R1 R2\n\
         ret_reg R3\n\
         ret_reg R4\n",
    )?;

    let output = Executor::new(SimProcessor::new(0)).run(&subroutine)?;
    assert_eq!(output.register("R3"), Some(1), "(7 + 8) mod 2");
    assert_eq!(output.register("R4"), Some(1), "(7 - 8) mod 2 is non-negative");
    Ok(())
}

#[test]
fn test_memory_persists_across_runs() -> Result<(), Box<dyn std::error::Error>> {
    let first = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         array 1 @0\n\
         set R0 5\n\
         store R0 @0[0]\n",
    )?;
    let second = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         load R1 @0[0]\n\
         ret_reg R1\n",
    )?;

    let mut executor = Executor::new(SimProcessor::new(0));
    executor.run(&first)?;
    let output = executor.run(&second)?;
    assert_eq!(output.register("R1"), Some(5), "Arrays should survive between runs");
    Ok(())
}

#[test]
fn test_wait_all_on_filled_slice() -> Result<(), Box<dyn std::error::Error>> {
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         array 2 @0\n\
         set R0 1\n\
         store R0 @0[0]\n\
         store R0 @0[1]\n\
         wait_all @0[0:2]\n\
         ret_arr @0\n",
    )?;

    let output = Executor::new(SimProcessor::new(0)).run(&subroutine)?;
    let array = output.arrays.values().next().expect("one returned array");
    assert_eq!(array, &vec![Some(1), Some(1)]);
    Ok(())
}

#[test]
fn test_wait_on_slice_that_never_fills() -> Result<(), Box<dyn std::error::Error>> {
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         array 2 @0\n\
         wait_all @0[0:2]\n",
    )?;

    let result = Executor::new(SimProcessor::new(0)).run(&subroutine);
    assert!(
        matches!(result, Err(NetQasmError::Execution { .. })),
        "A wait with no pending producer cannot complete",
    );
    Ok(())
}

#[test]
fn test_create_epr_fills_result_array() -> Result<(), Box<dyn std::error::Error>> {
    // One pair: a qubit-id array with one entry and a ten-word result array.
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         array 1 @0\n\
         set R0 0\n\
         store R0 @0[0]\n\
         array 1 @1\n\
         store R0 @1[0]\n\
         array 10 @2\n\
         set R1 1\n\
         set R2 0\n\
         set R3 0\n\
         set R4 1\n\
         set R5 2\n\
         create_epr R1 R2 R3 R4 R5\n\
         wait_all @2[0:10]\n\
         ret_arr @2\n",
    )?;

    let output = Executor::new(SimProcessor::new(3)).run(&subroutine)?;
    let results = output.arrays.values().next().expect("one returned array");
    assert_eq!(results.len(), netqasm::executor::ENT_INFO_LENGTH);
    assert!(results.iter().all(Option::is_some), "All entanglement words should be filled");
    Ok(())
}

#[test]
fn test_message_loopback() -> Result<(), Box<dyn std::error::Error>> {
    let subroutine = assemble(
        "# NETQASM 0.0\n\
         # APPID 0\n\
         array 2 @0\n\
         set R0 11\n\
         store R0 @0[0]\n\
         set R0 22\n\
         store R0 @0[1]\n\
         array 2 @1\n\
         set R1 0\n\
         send_msg R1 @0\n\
         recv_msg R1 @1\n\
         ret_arr @1\n",
    )?;

    let output = Executor::new(SimProcessor::new(0)).run(&subroutine)?;
    let received = output.arrays.values().next().expect("one returned array");
    assert_eq!(received, &vec![Some(11), Some(22)]);
    Ok(())
}

use std::io::Read;

use libc::sbrk;
use rallocator::{free, init, malloc, realloc};

/// Waits until the user presses ENTER. Useful when you want to inspect
/// memory state with tools like `pmap`, `htop`, `gdb`, or just visually
/// track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn print_alloc(label: &str, size: usize, addr: *mut u8) {
  println!(
    "[{}] requested {} bytes, address = {:?}, program break = {:?}",
    label,
    size,
    addr,
    unsafe { sbrk(0) },
  );
}

fn main() {
  env_logger::init();

  // Unlike a bump allocator, init() lays out a whole bucket-root table
  // plus an initial free chunk before we ever see a malloc call.
  assert_eq!(init(), 0, "sbrk should have plenty of room for the initial chunk");

  unsafe {
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate space for a u64.
    // --------------------------------------------------------------------
    let first_block = malloc(8);
    println!("\n[1] Allocate 8 bytes");
    print_alloc("1", 8, first_block);

    let first_ptr = first_block as *mut u64;
    first_ptr.write(0xDEADBEEF);
    println!("[1] Value written to first_block = 0x{:X}", first_ptr.read());
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate 12 bytes, then immediately free them.
    //
    //    Unlike a pure bump allocator, this block goes back on the
    //    segregated free list and can be handed out again.
    // --------------------------------------------------------------------
    let second_block = malloc(12);
    println!("\n[2] Allocate 12 bytes");
    print_alloc("2", 12, second_block);
    std::ptr::write_bytes(second_block, 0xAB, 12);

    free(second_block);
    println!("[2] Freed second_block at {:?}", second_block);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Allocate 12 bytes again and check whether it reused the freed
    //    block (it should - same bucket, LIFO insertion).
    // --------------------------------------------------------------------
    let third_block = malloc(12);
    println!("\n[3] Allocate 12 bytes again");
    print_alloc("3", 12, third_block);
    println!(
      "[3] third_block == second_block? {}",
      if third_block == second_block {
        "yes, the freed block was reused"
      } else {
        "no, it went elsewhere"
      }
    );
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Grow a block with realloc and confirm the original bytes moved.
    // --------------------------------------------------------------------
    let grown = realloc(third_block, 200);
    println!("\n[4] realloc third_block to 200 bytes -> {:?}", grown);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Allocate something large enough to force the heap to extend.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");
    let big_block = malloc(64 * 1024);
    println!("\n[5] Allocate a large 64 KiB block");
    print_alloc("5", 64 * 1024, big_block);
    print_program_break("after large alloc");

    println!("\n[6] End of demo. Process exit reclaims everything.");
  }
}

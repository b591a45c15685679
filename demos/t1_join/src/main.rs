//! Reproduces the join scenario: `main` creates A and waits on it
//! immediately; A runs to completion; `main` resumes and exits.

extern "C" fn worker_entry(_arg: u64) {
    let me = trilab::threads::current();
    let name = trilab::threads::name(me);
    for i in 0..3 {
        println!("{name}{i}");
        trilab::threads::yield_now();
    }
    trilab::threads::exit();
}

extern "C" fn main_entry(_arg: u64) {
    let a = trilab::threads::create("A", worker_entry, 0).expect("create A");
    println!("main waiting for A");
    trilab::threads::wait(Some(a));
    println!("main resumed after A finished");
    trilab::threads::exit();
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    trilab::threads::init(main_entry, 0)?;
    Ok(())
}

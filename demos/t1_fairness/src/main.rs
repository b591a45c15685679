//! Reproduces the fairness scenario: `main` creates A, B, C, each printing
//! and yielding three times; expected interleaving is
//! `A0 B0 C0 main0 A1 B1 C1 main1 A2 B2 C2 main2`.

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
    trilab::threads::create("A", worker_entry, 0).expect("create A");
    trilab::threads::create("B", worker_entry, 0).expect("create B");
    trilab::threads::create("C", worker_entry, 0).expect("create C");

    // main yields before printing each iteration so the freshly created
    // threads get to run first, producing the documented interleaving.
    for i in 0..3 {
        trilab::threads::yield_now();
        println!("main{i}");
    }
    trilab::threads::exit();
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    trilab::threads::init(main_entry, 0)?;
    Ok(())
}

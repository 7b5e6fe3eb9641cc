use std::io::Write;
use std::time::Duration;

use aio::{
    Aio,
    AioError,
    Batch,
    InFlight,
    IoContextBuilder,
    IoEvent,
    Request,
    Syscall,
};

const BLOCK: usize = 4096;

/// A context, or `None` when the kernel (or a sandbox) does not provide native AIO.
fn context(depth: usize) -> Option<Aio> {
    match IoContextBuilder::new().with_max_events(depth).build() {
        Ok(ctx) => Some(ctx),
        Err(AioError::Os { call: Syscall::IoSetup, errno }) if errno == libc::ENOSYS => None,
        Err(err) => panic!("io_setup failed: {}", err),
    }
}

fn file_with_blocks(blocks: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for n in 0..blocks {
        file.write_all(&[n as u8 + 1; BLOCK]).unwrap();
    }
    file.flush().unwrap();
    file
}

/// Reap until every token is retired, returning the completions' events keyed in retirement order.
fn reap_all(ctx: &mut Aio, mut in_flight: Vec<InFlight<'_, '_>>) -> Vec<IoEvent> {
    let mut retired = Vec::new();
    let mut events = vec![IoEvent::default(); in_flight.len()];

    for _ in 0..1000 {
        if in_flight.is_empty() {
            break;
        }
        let remaining = in_flight.len();
        let reaped = ctx
            .get_events(remaining, &mut events[..remaining], Some(Duration::from_millis(100)))
            .unwrap();
        assert!(reaped <= remaining);

        for event in &events[..reaped] {
            let pos = in_flight
                .iter()
                .position(|token| token.matches(event))
                .expect("completion for a request that is not in flight");
            let completion = in_flight.swap_remove(pos).retire(event).ok().unwrap();
            retired.push(*completion.event());
        }
    }

    assert!(in_flight.is_empty(), "requests still in flight");
    retired
}

#[test]
fn setup_and_destroy() {
    for depth in [1, 16, 128] {
        if let Some(ctx) = context(depth) {
            assert_ne!(0, ctx.id());
            ctx.destroy().unwrap();
        }
    }
}

#[test]
fn four_reads_complete_by_key() {
    let mut ctx = match context(128) {
        Some(ctx) => ctx,
        None => return,
    };
    let file = file_with_blocks(4);

    let mut buffers = vec![vec![0_u8; BLOCK]; 4];
    let mut requests: Vec<Request> = buffers
        .iter_mut()
        .enumerate()
        .map(|(n, buffer)| {
            let mut request = Request::new(file.as_file());
            request.read(buffer, (n * BLOCK) as u64).set_key(n as u64);
            request
        })
        .collect();

    let mut batch = Batch::new();
    for request in requests.iter_mut() {
        batch.push(request);
    }
    let submitted = unsafe { batch.submit(&ctx) }.unwrap();
    assert_eq!(4, submitted.in_flight.len());
    assert!(submitted.rejected.is_empty());

    let events = reap_all(&mut ctx, submitted.in_flight);
    let mut keys: Vec<u64> = events.iter().map(|event| event.data).collect();
    keys.sort_unstable();
    assert_eq!(vec![0, 1, 2, 3], keys);
    for event in &events {
        assert_eq!(BLOCK as i64, event.res);
        assert_eq!(0, event.res2);
    }

    drop(requests);
    for (n, buffer) in buffers.iter().enumerate() {
        assert!(buffer.iter().all(|&b| b == n as u8 + 1));
    }
    ctx.destroy().unwrap();
}

#[test]
fn vectored_write_then_read() {
    let mut ctx = match context(8) {
        Some(ctx) => ctx,
        None => return,
    };
    let file = tempfile::NamedTempFile::new().unwrap();

    let head = [0xAA_u8; 100];
    let tail = [0xBB_u8; 28];
    let mut write = Request::new(file.as_file());
    write.writev(vec![&head[..], &tail[..]], 0).set_key(1);
    let mut batch = Batch::new();
    batch.push(&mut write);
    let in_flight = unsafe { batch.submit(&ctx) }.unwrap().in_flight;
    let events = reap_all(&mut ctx, in_flight);
    assert_eq!(128, events[0].res);

    let mut first = [0_u8; 64];
    let mut second = [0_u8; 64];
    let mut read = Request::new(file.as_file());
    read.readv([&mut first[..], &mut second[..]], 0).set_key(2);
    let mut batch = Batch::new();
    batch.push(&mut read);
    let in_flight = unsafe { batch.submit(&ctx) }.unwrap().in_flight;
    let events = reap_all(&mut ctx, in_flight);
    assert_eq!(128, events[0].res);

    drop(read);
    assert!(first.iter().all(|&b| b == 0xAA));
    assert!(second[..36].iter().all(|&b| b == 0xAA));
    assert!(second[36..].iter().all(|&b| b == 0xBB));
}

#[test]
fn fsync_through_shared_reaper() {
    let ctx = match context(8) {
        Some(ctx) => ctx,
        None => return,
    };
    let file = file_with_blocks(1);

    let mut sync = Request::new(file.as_file());
    sync.fdatasync().set_key(7);
    let mut batch = Batch::new();
    batch.push(&mut sync);
    let mut in_flight = unsafe { batch.submit(&ctx) }.unwrap().in_flight;

    let mut reaper = ctx.reaper().unwrap();
    assert!(ctx.reaper().is_err());
    let mut events = [IoEvent::default(); 1];
    let mut reaped = 0;
    for _ in 0..100 {
        reaped = reaper.get_events(1, &mut events, Some(Duration::from_millis(100))).unwrap();
        if reaped > 0 {
            break;
        }
    }
    assert_eq!(1, reaped);
    assert_eq!(7, events[0].data);

    let completion = in_flight.pop().unwrap().retire(&events[0]).ok().unwrap();
    assert_eq!(0, completion.bytes().unwrap());
}

#[test]
fn empty_context_poll_returns_nothing() {
    let mut ctx = match context(4) {
        Some(ctx) => ctx,
        None => return,
    };
    let mut events = [IoEvent::default(); 4];
    assert_eq!(0, ctx.get_events(0, &mut events, Some(Duration::ZERO)).unwrap());

    let mut ctx = IoContextBuilder::new().with_max_events(4).with_user_ring(false).build().unwrap();
    assert_eq!(0, ctx.get_events(0, &mut events, Some(Duration::ZERO)).unwrap());
}

#[test]
fn cancel_of_file_read_is_refused() {
    let mut ctx = match context(8) {
        Some(ctx) => ctx,
        None => return,
    };
    let file = file_with_blocks(1);

    let mut buffer = vec![0_u8; BLOCK];
    let mut read = Request::new(file.as_file());
    read.read(&mut buffer, 0).set_key(3);
    let mut batch = Batch::new();
    batch.push(&mut read);
    let mut in_flight = unsafe { batch.submit(&ctx) }.unwrap().in_flight;

    // regular file reads cannot be cancelled; the refusal depends on whether the read finished
    match in_flight[0].cancel(&ctx).unwrap_err() {
        AioError::NotFound | AioError::AlreadyCompleted => {},
        err => panic!("unexpected cancel error: {}", err),
    }

    let events = reap_all(&mut ctx, in_flight);
    assert_eq!(1, events.len());
    assert_eq!(BLOCK as i64, events[0].res);
}

//! Print a file to stdout, reading it through the kernel AIO interface in aligned blocks.
//!
//! usage: file_cat <path> [--direct]
use std::fs::File;
use std::io::Write;
use std::time::Duration;

use aio::{
    into_io_error,
    open_direct,
    AlignedBuffer,
    Batch,
    IoContextBuilder,
    IoEvent,
    Request,
};

const BLOCK: usize = 4096;
const BLOCKS_PER_TURN: usize = 8;

pub fn main() -> std::io::Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().expect("usage: file_cat <path> [--direct]");
    let file = if args.next().as_deref() == Some("--direct") {
        open_direct(&path, libc::O_RDONLY, 0)?
    } else {
        File::open(&path)?
    };
    let len = file.metadata()?.len();

    // Declared before the context, so on an early return the context is destroyed first and
    // io_destroy waits for any read still writing into them.
    let mut buffers = (0..BLOCKS_PER_TURN)
        .map(|_| AlignedBuffer::new(BLOCK))
        .collect::<std::io::Result<Vec<_>>>()?;

    let mut ctx = IoContextBuilder::new()
        .with_max_events(BLOCKS_PER_TURN)
        .build()
        .map_err(into_io_error)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut offset = 0_u64;

    while offset < len {
        let mut requests: Vec<Request> = buffers
            .iter_mut()
            .enumerate()
            .map(|(n, buffer)| {
                let mut request = Request::new(&file);
                request.read(buffer, offset + (n * BLOCK) as u64).set_key(n as u64);
                request
            })
            .collect();

        let mut batch = Batch::with_capacity(requests.len());
        for request in requests.iter_mut() {
            batch.push(request);
        }

        // short submissions are simply retried
        let mut in_flight = Vec::new();
        let mut pending = batch;
        while !pending.is_empty() {
            // every token is retired below before the buffers are read or reused
            let submitted = unsafe { pending.submit(&ctx) }.map_err(into_io_error)?;
            in_flight.extend(submitted.in_flight);
            pending = Batch::new();
            for request in submitted.rejected {
                pending.push(request);
            }
        }

        let mut lengths = vec![0_usize; BLOCKS_PER_TURN];
        let mut events = vec![IoEvent::default(); BLOCKS_PER_TURN];
        while !in_flight.is_empty() {
            let reaped = ctx
                .get_events(1, &mut events[..in_flight.len()], Some(Duration::from_secs(1)))
                .map_err(into_io_error)?;
            for event in &events[..reaped] {
                if let Some(pos) = in_flight.iter().position(|token| token.matches(event)) {
                    if let Ok(completion) = in_flight.swap_remove(pos).retire(event) {
                        lengths[completion.key() as usize] = completion.bytes()?;
                    }
                }
            }
        }

        drop(requests);
        for (buffer, length) in buffers.iter().zip(lengths) {
            out.write_all(&buffer[..length])?;
        }
        offset += (BLOCK * BLOCKS_PER_TURN) as u64;
    }

    ctx.destroy().map_err(into_io_error)
}

use std::io::{self, Write};
use std::time::Duration;

use aio::{
    check_direct_buffer,
    open_direct,
    AlignedBuffer,
    Batch,
    IoContextBuilder,
    IoEvent,
    Request,
    ALIGN_SIZE,
};

const LEN: usize = 8 * ALIGN_SIZE;

// tmpfs and some overlay filesystems refuse O_DIRECT, so work next to the build output instead.
fn scratch_dir() -> tempfile::TempDir {
    tempfile::tempdir_in(env!("CARGO_TARGET_TMPDIR")).unwrap()
}

#[test]
fn direct_read_round_trip() {
    let dir = scratch_dir();
    let path = dir.path().join("direct.bin");
    {
        let mut file = std::fs::File::create(&path).unwrap();
        let data: Vec<u8> = (0..LEN).map(|n| (n % 251) as u8).collect();
        file.write_all(&data).unwrap();
        file.sync_all().unwrap();
    }

    let file = match open_direct(&path, libc::O_RDONLY, 0) {
        Ok(file) => file,
        Err(err) if err.raw_os_error() == Some(libc::EINVAL) => return,
        Err(err) => panic!("open_direct failed: {}", err),
    };
    let mut ctx = match IoContextBuilder::new().with_max_events(4).build() {
        Ok(ctx) => ctx,
        Err(err) if err.raw_os_error() == Some(libc::ENOSYS) => return,
        Err(err) => panic!("io_setup failed: {}", err),
    };

    let mut buffer = AlignedBuffer::new(LEN).unwrap();
    let mut read = Request::new(&file);
    read.read(&mut buffer, 0).set_key(0xD1);
    let mut batch = Batch::new();
    batch.push(&mut read);
    let mut in_flight = unsafe { batch.submit(&ctx) }.unwrap().in_flight;

    let mut events = [IoEvent::default(); 1];
    let mut reaped = 0;
    for _ in 0..100 {
        reaped = ctx.get_events(1, &mut events, Some(Duration::from_millis(100))).unwrap();
        if reaped > 0 {
            break;
        }
    }
    assert_eq!(1, reaped);

    let completion = in_flight.pop().unwrap().retire(&events[0]).ok().unwrap();
    assert_eq!(0xD1, completion.key());
    assert_eq!(LEN, completion.bytes().unwrap());

    drop(read);
    assert!(buffer.iter().enumerate().all(|(n, &b)| b == (n % 251) as u8));
}

#[test]
fn misaligned_direct_read() {
    let dir = scratch_dir();
    let path = dir.path().join("misaligned.bin");
    std::fs::write(&path, vec![7_u8; LEN]).unwrap();

    let file = match open_direct(&path, libc::O_RDONLY, 0) {
        Ok(file) => file,
        Err(err) if err.raw_os_error() == Some(libc::EINVAL) => return,
        Err(err) => panic!("open_direct failed: {}", err),
    };
    let mut ctx = match IoContextBuilder::new().with_max_events(4).build() {
        Ok(ctx) => ctx,
        Err(err) if err.raw_os_error() == Some(libc::ENOSYS) => return,
        Err(err) => panic!("io_setup failed: {}", err),
    };

    // one byte off the alignment boundary
    let mut buffer = AlignedBuffer::new(2 * ALIGN_SIZE).unwrap();
    let misaligned = &mut buffer[1..ALIGN_SIZE + 1];
    assert_eq!(io::ErrorKind::InvalidInput, check_direct_buffer(misaligned).unwrap_err().kind());

    let mut read = Request::new(&file);
    read.read(misaligned, 0);
    let mut batch = Batch::new();
    batch.push(&mut read);

    // Kernels enforce the device's DMA alignment, which may be finer than ALIGN_SIZE, so the read
    // is either refused (by io_submit or in the completion) or served in full.
    let mut in_flight = match unsafe { batch.submit(&ctx) } {
        Ok(submitted) => submitted.in_flight,
        Err(err) => {
            assert_eq!(Some(libc::EINVAL), err.raw_os_error());
            return;
        },
    };

    let mut events = [IoEvent::default(); 1];
    let mut reaped = 0;
    for _ in 0..100 {
        reaped = ctx.get_events(1, &mut events, Some(Duration::from_millis(100))).unwrap();
        if reaped > 0 {
            break;
        }
    }
    assert_eq!(1, reaped);
    let completion = in_flight.pop().unwrap().retire(&events[0]).ok().unwrap();
    match completion.bytes() {
        Ok(read) => assert_eq!(ALIGN_SIZE, read),
        Err(err) => assert_eq!(Some(libc::EINVAL), err.raw_os_error()),
    }
}

#[test]
fn open_direct_creates_with_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = scratch_dir();
    let path = dir.path().join("created.bin");
    match open_direct(&path, libc::O_WRONLY | libc::O_CREAT | libc::O_EXCL, 0o600) {
        Ok(_) => {},
        Err(err) if err.raw_os_error() == Some(libc::EINVAL) => return,
        Err(err) => panic!("open_direct failed: {}", err),
    }

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(0o600, mode & 0o777);

    let err = open_direct(&path, libc::O_WRONLY | libc::O_CREAT | libc::O_EXCL, 0o600).unwrap_err();
    assert_eq!(io::ErrorKind::AlreadyExists, err.kind());
}

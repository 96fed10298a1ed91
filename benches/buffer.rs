#![feature(test)]
extern crate scull;
extern crate test;
#[macro_use]
extern crate trackable;

use scull::buffer::BufferBuilder;
use test::Bencher;

#[bench]
fn append_small(b: &mut Bencher) {
    let mut buffer = track_try_unwrap!(BufferBuilder::new().build());
    let data = b"foo";
    b.iter(|| {
        let position = buffer.size();
        track_try_unwrap!(buffer.write(position, data));
    });
}

#[bench]
fn overwrite_quantum(b: &mut Bencher) {
    let mut buffer = track_try_unwrap!(BufferBuilder::new().build());
    let data = vec![1; 4000];
    track_try_unwrap!(buffer.write(0, &data));
    b.iter(|| {
        track_try_unwrap!(buffer.write(0, &data));
    });
}

#[bench]
fn read_quantum(b: &mut Bencher) {
    let mut buffer = track_try_unwrap!(BufferBuilder::new().build());
    let data = vec![1; 4000];
    track_try_unwrap!(buffer.write(0, &data));
    let mut buf = vec![0; 4000];
    b.iter(|| {
        assert_eq!(buffer.read(0, &mut buf), 4000);
    });
}

#[bench]
fn read_far_item(b: &mut Bencher) {
    let mut buffer = track_try_unwrap!(BufferBuilder::new().quantum_size(4).qset_size(2).build());
    track_try_unwrap!(buffer.write(8 * 999, b"foo"));
    let mut buf = [0; 3];
    b.iter(|| {
        assert_eq!(buffer.read(8 * 999, &mut buf), 3);
    });
}

#[bench]
fn write_and_trim(b: &mut Bencher) {
    let mut buffer = track_try_unwrap!(BufferBuilder::new().quantum_size(64).qset_size(16).build());
    let data = vec![1; 64];
    b.iter(|| {
        for i in 0..32 {
            track_try_unwrap!(buffer.write(i * 64, &data));
        }
        buffer.trim();
    });
}

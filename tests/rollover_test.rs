use std::path::Path;
use std::sync::Arc;

use tempfile::tempdir;
use yijinjing::types::{
    FRAME_HEADER_LENGTH, MAX_FRAME_LENGTH, MSG_PAGE_END, PAGE_HEADER_LENGTH, PAGE_SIZE,
};
use yijinjing::{Category, Location, Locator, Mode, NoopPublisher, Reader, Writer};

fn test_location(root: &Path) -> Arc<Location> {
    let locator = Arc::new(Locator::with_root(root));
    Location::new(Mode::Live, Category::System, "roll", "roll", locator)
}

/// Filling a page and writing one more frame must yield two consecutive
/// page files with a contiguous frame sequence: no gap, no duplicate, and
/// the page-end marker never surfaces.
#[test]
fn test_page_rollover_keeps_stream_contiguous() {
    let dir = tempdir().unwrap();
    let home = test_location(dir.path());

    // maximum-size frames: seven fill page 1, the eighth rolls to page 2
    let payload_len = (MAX_FRAME_LENGTH - FRAME_HEADER_LENGTH) as usize;
    let mut payload = vec![0u8; payload_len];
    let frames = 8;

    let mut writer = Writer::new(&home, 0, true, Arc::new(NoopPublisher)).unwrap();
    for i in 0..frames {
        payload[0] = i as u8;
        payload[payload_len - 1] = i as u8;
        writer.write(0, 1 + i as i32, &payload).unwrap();
    }

    assert_eq!(
        home.locator.list_page_id(&home, 0).unwrap(),
        vec![1, 2],
        "exactly two consecutive pages"
    );

    let mut reader = Reader::new(true);
    reader.join(&home, 0, 0).unwrap();
    let mut seen = Vec::new();
    while reader.data_available().unwrap() {
        let frame = reader.current_frame();
        assert_ne!(frame.msg_type(), MSG_PAGE_END, "marker must not surface");
        assert_eq!(frame.data_length() as usize, payload_len);
        let marker = (frame.msg_type() - 1) as u8;
        assert_eq!(frame.data()[0], marker);
        assert_eq!(frame.data()[payload_len - 1], marker);
        seen.push(frame.msg_type());
        reader.next().unwrap();
    }

    let expected: Vec<i32> = (1..=frames as i32).collect();
    assert_eq!(seen, expected, "no gap, no duplicate across the boundary");
}

/// A reader standing at the end of an exactly-filled page keeps up when
/// the writer rolls, even though no marker fit into the old page.
#[test]
fn test_reader_follows_rollover_live() {
    let dir = tempdir().unwrap();
    let home = test_location(dir.path());

    let payload_len = (MAX_FRAME_LENGTH - FRAME_HEADER_LENGTH) as usize;
    let payload = vec![7u8; payload_len];

    let mut writer = Writer::new(&home, 0, true, Arc::new(NoopPublisher)).unwrap();
    let mut reader = Reader::new(true);
    reader.join(&home, 0, 0).unwrap();

    // drain page 1 as it fills
    for i in 0..7 {
        writer.write(0, 1 + i, &payload).unwrap();
        assert!(reader.data_available().unwrap());
        assert_eq!(reader.current_frame().msg_type(), 1 + i);
        assert!(!reader.current_page().is_full());
        reader.next().unwrap();
    }
    assert!(!reader.data_available().unwrap());

    // fill the page to its exact last byte
    let tail_len = (PAGE_SIZE - PAGE_HEADER_LENGTH) as usize
        - 7 * MAX_FRAME_LENGTH as usize
        - FRAME_HEADER_LENGTH as usize;
    writer.write(0, 8, &vec![8u8; tail_len]).unwrap();
    assert!(reader.data_available().unwrap());
    assert_eq!(reader.current_frame().msg_type(), 8);
    assert!(reader.current_page().is_full());
    reader.next().unwrap();
    assert!(!reader.data_available().unwrap());

    // the next write lands on page 2; the reader crosses over
    writer.write(0, 100, b"over").unwrap();
    assert_eq!(home.locator.list_page_id(&home, 0).unwrap(), vec![1, 2]);
    assert!(reader.data_available().unwrap());
    let frame = reader.current_frame();
    assert_eq!(frame.msg_type(), 100);
    assert_eq!(frame.data(), b"over");
}

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::tempdir;
use yijinjing::{
    AssembleMode, Assembler, Category, CopySink, ErrorCode, Frame, Location, Locator, Mode,
    NoopPublisher, Reader, Sink, Writer,
};

fn md_location(root: &Path, group: &str, name: &str) -> Arc<Location> {
    let locator = Arc::new(Locator::with_root(root));
    Location::new(Mode::Live, Category::Md, group, name, locator)
}

fn write_frames(location: &Arc<Location>, dest_id: u32, frames: &[(i64, i32, &[u8])]) {
    let mut writer = Writer::new(location, dest_id, true, Arc::new(NoopPublisher)).unwrap();
    for (gen_time, msg_type, payload) in frames {
        let mut frame = writer
            .open_frame(*gen_time, *msg_type, payload.len())
            .unwrap();
        frame.copy_data(payload);
        writer.close_frame(payload.len(), *gen_time).unwrap();
    }
}

fn channel_set(assembler: &Assembler) -> BTreeSet<(PathBuf, u32, u32)> {
    assembler
        .channels()
        .into_iter()
        .map(|(locator, uid, dest_id)| (locator.root().to_path_buf(), uid, dest_id))
        .collect()
}

#[derive(Default)]
struct CollectSink {
    frames: Vec<(u32, u32, i64, Vec<u8>)>,
}

impl Sink for CollectSink {
    fn put(
        &mut self,
        location: &Arc<Location>,
        dest_id: u32,
        frame: &Frame<'_>,
    ) -> yijinjing::Result<()> {
        self.frames
            .push((location.uid, dest_id, frame.gen_time(), frame.data().to_vec()));
        Ok(())
    }
}

#[test]
fn test_assembler_merges_streams_in_time_order() {
    let dir = tempdir().unwrap();
    let a = md_location(dir.path(), "a", "x");
    let b = md_location(dir.path(), "b", "y");
    write_frames(&a, 0, &[(10, 1, b"a10"), (30, 1, b"a30")]);
    write_frames(&b, 0, &[(20, 1, b"b20"), (40, 1, b"b40")]);

    let locator = Arc::new(Locator::with_root(dir.path()));
    let mut assembler = Assembler::new(&[locator], "live", "md", "*", "*").unwrap();

    let mut sink = CollectSink::default();
    assembler.drain_into(&mut sink).unwrap();

    let times: Vec<i64> = sink.frames.iter().map(|f| f.2).collect();
    assert_eq!(times, vec![10, 20, 30, 40]);
    let payloads: Vec<&[u8]> = sink.frames.iter().map(|f| f.3.as_slice()).collect();
    assert_eq!(payloads, vec![b"a10" as &[u8], b"b20", b"a30", b"b40"]);
}

#[test]
fn test_equal_gen_times_break_ties_by_uid_then_dest() {
    let dir = tempdir().unwrap();
    let a = md_location(dir.path(), "a", "x");
    let b = md_location(dir.path(), "b", "y");
    write_frames(&a, 0, &[(100, 1, b"a")]);
    write_frames(&b, 0, &[(100, 1, b"b")]);

    let locator = Arc::new(Locator::with_root(dir.path()));
    let mut assembler = Assembler::new(&[locator], "live", "md", "*", "*").unwrap();

    let mut sources = Vec::new();
    while assembler.data_available().unwrap() {
        sources.push(assembler.current_frame().source());
        assembler.next().unwrap();
    }

    let mut expected = vec![a.uid, b.uid];
    expected.sort_unstable();
    assert_eq!(sources, expected);
}

#[test]
fn test_assemble_mode_selects_channels() {
    let dir = tempdir().unwrap();
    let source = md_location(dir.path(), "bin", "ctp");
    let other = md_location(dir.path(), "bin", "xtp");
    write_frames(&source, 0, &[(10, 1, b"s0")]);
    write_frames(&source, 5, &[(11, 1, b"s5")]);
    write_frames(&other, 0, &[(12, 1, b"o0")]);

    let root = dir.path().to_path_buf();

    let channel = Assembler::from_source(&source, 0, AssembleMode::CHANNEL, 0).unwrap();
    assert_eq!(
        channel_set(&channel),
        BTreeSet::from([(root.clone(), source.uid, 0)])
    );

    let write = Assembler::from_source(&source, 0, AssembleMode::WRITE, 0).unwrap();
    assert_eq!(
        channel_set(&write),
        BTreeSet::from([(root.clone(), source.uid, 0), (root.clone(), source.uid, 5)])
    );

    let read = Assembler::from_source(&source, 0, AssembleMode::READ, 0).unwrap();
    assert_eq!(
        channel_set(&read),
        BTreeSet::from([(root.clone(), source.uid, 0), (root.clone(), other.uid, 0)])
    );

    let all = Assembler::from_source(&source, 0, AssembleMode::ALL, 0).unwrap();
    assert_eq!(
        channel_set(&all),
        BTreeSet::from([
            (root.clone(), source.uid, 0),
            (root.clone(), source.uid, 5),
            (root, other.uid, 0),
        ])
    );
}

#[test]
fn test_extend_then_remove_restores_channels() {
    let dir = tempdir().unwrap();
    let a = md_location(dir.path(), "a", "x");
    let b = md_location(dir.path(), "b", "y");
    write_frames(&a, 0, &[(10, 1, b"a")]);
    write_frames(&b, 0, &[(20, 1, b"b")]);

    let mut left = Assembler::from_source(&a, 0, AssembleMode::CHANNEL, 0).unwrap();
    let right = Assembler::from_source(&b, 0, AssembleMode::CHANNEL, 0).unwrap();

    let before = channel_set(&left);
    left.extend(&right).unwrap();
    assert_eq!(channel_set(&left).len(), 2);
    left.remove(&right).unwrap();
    assert_eq!(channel_set(&left), before);
}

#[test]
fn test_merge_is_commutative_on_the_joined_set() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    let on_a = md_location(dir_a.path(), "bin", "ctp");
    let on_b = md_location(dir_b.path(), "bin", "ctp");
    write_frames(&on_a, 0, &[(10, 1, b"a")]);
    write_frames(&on_b, 0, &[(20, 1, b"b")]);

    let left = Assembler::from_source(&on_a, 0, AssembleMode::CHANNEL, 0).unwrap();
    let right = Assembler::from_source(&on_b, 0, AssembleMode::CHANNEL, 0).unwrap();

    let ab = left.merge(&right).unwrap();
    let ba = right.merge(&left).unwrap();
    assert_eq!(channel_set(&ab), channel_set(&ba));
    assert_eq!(channel_set(&ab).len(), 2);

    // operator sugar goes through the same path
    let sum = (&left + &right).unwrap();
    assert_eq!(channel_set(&sum), channel_set(&ab));
}

#[test]
fn test_merge_rejects_mismatched_identity() {
    let dir = tempdir().unwrap();
    let md = md_location(dir.path(), "bin", "ctp");
    let locator = Arc::new(Locator::with_root(dir.path()));
    let td = Location::new(Mode::Live, Category::Td, "bin", "ctp", locator);
    write_frames(&md, 0, &[(10, 1, b"m")]);
    write_frames(&td, 0, &[(20, 1, b"t")]);

    let left = Assembler::from_source(&md, 0, AssembleMode::CHANNEL, 0).unwrap();
    let right = Assembler::from_source(&td, 0, AssembleMode::CHANNEL, 0).unwrap();

    let err = left.merge(&right).unwrap_err();
    assert_eq!(err.code(), ErrorCode::IncompatibleAssemble);
}

#[test]
fn test_copy_sink_reemits_frames_under_target_root() {
    let source_dir = tempdir().unwrap();
    let target_dir = tempdir().unwrap();
    let source = md_location(source_dir.path(), "bin", "ctp");
    write_frames(&source, 0, &[(10, 7, b"aa"), (20, 8, b"bb")]);

    let target_locator = Arc::new(Locator::with_root(target_dir.path()));
    let mut sink = CopySink::new(Arc::clone(&target_locator));
    let mut assembler = Assembler::from_source(&source, 0, AssembleMode::CHANNEL, 0).unwrap();
    assembler.drain_into(&mut sink).unwrap();

    let target = Location::new(Mode::Live, Category::Md, "bin", "ctp", target_locator);
    let mut reader = Reader::new(true);
    reader.join(&target, 0, 0).unwrap();

    assert!(reader.data_available().unwrap());
    let frame = reader.current_frame();
    assert_eq!(frame.gen_time(), 10);
    assert_eq!(frame.trigger_time(), 10);
    assert_eq!(frame.msg_type(), 7);
    assert_eq!(frame.data(), b"aa");
    assert_eq!(frame.source(), target.uid);
    reader.next().unwrap();

    assert!(reader.data_available().unwrap());
    let frame = reader.current_frame();
    assert_eq!(frame.gen_time(), 20);
    assert_eq!(frame.msg_type(), 8);
    assert_eq!(frame.data(), b"bb");
    reader.next().unwrap();
    assert!(!reader.data_available().unwrap());
}

use super::*;
use crate::foundation::core::TARGET_CANVAS;

fn sink_cfg(bitrate: Option<u32>) -> SinkConfig {
    SinkConfig {
        width: TARGET_CANVAS.width,
        height: TARGET_CANVAS.height,
        fps: CAPTURE_FPS,
        mime_type: "video/mp4".to_string(),
        video_bits_per_second: bitrate,
    }
}

fn blank_frame() -> FrameRGBA {
    FrameRGBA {
        width: TARGET_CANVAS.width,
        height: TARGET_CANVAS.height,
        data: vec![0; TARGET_CANVAS.rgba8_len()],
        premultiplied: true,
    }
}

#[test]
fn clock_advances_only_while_a_frame_is_requested() {
    let mut host = MemoryHost::new(MemoryScript::default());
    let mut src = host.load_video(Arc::from(vec![1u8])).unwrap();
    let mut sink = host.create_sink(&sink_cfg(None), None).unwrap();

    src.play().unwrap();
    assert_eq!(host.next_event(&mut src, &mut sink), None);

    let id = host.request_animation_frame();
    assert_eq!(
        host.next_event(&mut src, &mut sink),
        Some(HostEvent::AnimationFrame(id))
    );
    assert_eq!(src.position(), 0.0);
    assert_eq!(host.elapsed(), Duration::ZERO);
    assert_eq!(host.next_event(&mut src, &mut sink), None);

    let id = host.request_animation_frame();
    assert_eq!(
        host.next_event(&mut src, &mut sink),
        Some(HostEvent::AnimationFrame(id))
    );
    let tick = host.script_mut().tick;
    assert!((src.position() - tick.as_secs_f64()).abs() < 1e-9);
    assert_eq!(host.elapsed(), tick);
}

#[test]
fn first_frame_after_play_is_the_start_position() {
    let mut host = MemoryHost::new(MemoryScript::default());
    let mut src = host.load_video(Arc::from(vec![1u8])).unwrap();
    let mut sink = host.create_sink(&sink_cfg(None), None).unwrap();
    src.seek(0.5).unwrap();
    src.play().unwrap();

    host.request_animation_frame();
    host.next_event(&mut src, &mut sink);
    assert_eq!(src.position(), 0.5);
    let frame = src.current_frame().unwrap();
    assert_eq!(&frame.data[..3], &frame_color(0.5)[..]);
}

#[test]
fn source_signals_end_at_duration() {
    let mut host = MemoryHost::new(MemoryScript {
        duration: 0.06,
        ..MemoryScript::default()
    });
    let mut src = host.load_video(Arc::from(vec![1u8])).unwrap();
    let mut sink = host.create_sink(&sink_cfg(None), None).unwrap();
    src.play().unwrap();

    // 0.06s at 30 fps is two frames: 0.0 and 1/30.
    for _ in 0..2 {
        host.request_animation_frame();
        assert!(matches!(
            host.next_event(&mut src, &mut sink),
            Some(HostEvent::AnimationFrame(_))
        ));
    }
    host.request_animation_frame();
    assert_eq!(
        host.next_event(&mut src, &mut sink),
        Some(HostEvent::Source(SourceEvent::Ended))
    );
    assert_eq!(src.state(), PlaybackState::Ended);
    assert_eq!(src.position(), 0.06);
}

#[test]
fn sink_flushes_by_timeslice_and_on_stop() {
    let mut host = MemoryHost::new(MemoryScript::default());
    let mut src = host.load_video(Arc::from(vec![1u8])).unwrap();
    let mut sink = host.create_sink(&sink_cfg(None), None).unwrap();
    sink.start(Duration::from_millis(100)).unwrap();

    for _ in 0..4 {
        sink.push_frame(&blank_frame()).unwrap();
    }
    sink.stop().unwrap();
    assert_eq!(sink.state(), SinkState::Stopping);

    let mut chunks = Vec::new();
    while let Some(HostEvent::Sink(ev)) = host.next_event(&mut src, &mut sink) {
        chunks.push(ev);
    }
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0], SinkEvent::Data(vec![0, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0]));
    assert_eq!(chunks[1], SinkEvent::Data(vec![3, 0, 0, 0]));
    assert_eq!(chunks[2], SinkEvent::Stopped);
    assert_eq!(sink.state(), SinkState::Stopped);
}

#[test]
fn bitrate_rejection_is_counted() {
    let mut host = MemoryHost::new(MemoryScript {
        reject_bitrate: true,
        ..MemoryScript::default()
    });
    assert!(matches!(
        host.create_sink(&sink_cfg(Some(8_000_000)), None),
        Err(ReelmarkError::Encoder(_))
    ));
    assert!(host.create_sink(&sink_cfg(None), None).is_ok());
    let stats = host.stats();
    assert_eq!(stats.sink_rejections, 1);
    assert_eq!(stats.sinks_created, 1);
}

#[test]
fn release_is_counted_once() {
    let mut host = MemoryHost::new(MemoryScript::default());
    let mut src = host.load_video(Arc::from(vec![1u8])).unwrap();
    src.release();
    src.release();
    assert!(src.is_released());
    assert_eq!(host.stats().releases, 1);
    assert!(src.current_frame().is_err());
}

#[test]
fn load_error_and_empty_buffer_fail_as_media_load() {
    let mut host = MemoryHost::new(MemoryScript::default());
    assert!(matches!(
        host.load_video(Arc::from(Vec::<u8>::new())),
        Err(ReelmarkError::MediaLoad(_))
    ));

    host.script_mut().load_error = Some("unsupported format".to_string());
    assert!(matches!(
        host.load_video(Arc::from(vec![1u8])),
        Err(ReelmarkError::MediaLoad(_))
    ));
}

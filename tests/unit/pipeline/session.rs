use super::*;

#[test]
fn chunks_are_concatenated_in_delivery_order() {
    let mut s = CaptureSession::new("video/mp4");
    s.push(vec![1, 2]);
    s.push(Vec::new());
    s.push(vec![3]);
    s.push(vec![4, 5, 6]);
    assert_eq!(s.total_len(), 6);

    let out = s.finish().unwrap();
    assert_eq!(out.bytes, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(out.mime_type, "video/mp4");
}

#[test]
fn zero_bytes_is_an_empty_output_error() {
    let mut s = CaptureSession::new("video/webm");
    s.push(Vec::new());
    let err = s.finish().unwrap_err();
    assert!(matches!(err, ReelmarkError::EmptyOutput { ref mime_type } if mime_type == "video/webm"));
}

use form_autofill::frames::locator::FieldLocator;
use form_autofill::frames::web_frames::{MAX_FRAME_DEPTH, WebFrames};
use form_autofill::protocol::field_model::{FieldSnapshot, FieldType};
use form_autofill::protocol::messages::{FrameInfo, FrameRef, Point, Rect};
use form_autofill::scenario::page::ScriptedPage;

// =========================================================================
// Helpers
// =========================================================================

const TOP: &str = "https://shop.example.com/checkout";
const OUTER: &str = "https://pay.example.net/outer";
const INNER: &str = "https://pay.example.net/inner";

/// TOP contains OUTER at (100, 200); OUTER contains INNER at (10, 20).
fn nested_frames() -> WebFrames {
    let mut frames = WebFrames::new();
    frames.reset(TOP);
    frames.set_frames([
        FrameInfo::child(OUTER, TOP, 100.0, 200.0),
        FrameInfo::child(INNER, OUTER, 10.0, 20.0),
    ]);
    frames
}

// =========================================================================
// WebFrames
// =========================================================================

#[test]
fn path_lists_ancestors_innermost_first() {
    let frames = nested_frames();
    assert_eq!(frames.frames_in_path(INNER), vec![INNER, OUTER, TOP]);
    assert_eq!(frames.frames_in_path(TOP), vec![TOP]);
    assert_eq!(frames.main_href(), Some(TOP));
    assert_eq!(frames.len(), 3);
}

#[test]
fn viewport_offset_sums_ancestor_positions() {
    let frames = nested_frames();
    assert_eq!(frames.viewport_offset(INNER), Point { x: 110.0, y: 220.0 });
    assert_eq!(frames.viewport_offset(OUTER), Point { x: 100.0, y: 200.0 });
    assert_eq!(frames.viewport_offset(TOP), Point::default());
}

#[test]
fn unknown_frame_has_no_ancestors() {
    let frames = nested_frames();
    assert_eq!(frames.frames_in_path("https://elsewhere.org/"), vec!["https://elsewhere.org/"]);
    assert_eq!(frames.viewport_offset("https://elsewhere.org/"), Point::default());
}

#[test]
fn cyclic_parent_links_terminate() {
    let mut frames = WebFrames::new();
    frames.set_frames([
        FrameInfo::child("https://a.test/", "https://b.test/", 1.0, 1.0),
        FrameInfo::child("https://b.test/", "https://a.test/", 1.0, 1.0),
    ]);
    let path = frames.frames_in_path("https://a.test/");
    assert_eq!(path, vec!["https://a.test/", "https://b.test/"]);
}

#[test]
fn deep_chains_are_cut_at_max_depth() {
    let mut frames = WebFrames::new();
    let hrefs: Vec<String> = (0..=MAX_FRAME_DEPTH + 5).map(|i| format!("https://f{}.test/", i)).collect();
    frames.reset(&hrefs[0]);
    for pair in hrefs.windows(2) {
        frames.set_frame_info(FrameInfo::child(&pair[1], &pair[0], 0.0, 0.0));
    }
    let deepest = hrefs.last().unwrap();
    assert_eq!(frames.frames_in_path(deepest).len(), MAX_FRAME_DEPTH + 1);
}

#[test]
fn reset_drops_previous_page_frames() {
    let mut frames = nested_frames();
    frames.reset("https://next.example.com/");
    assert_eq!(frames.len(), 1);
    assert!(frames.frame_info(OUTER).is_none());
}

// =========================================================================
// FieldLocator
// =========================================================================

#[test]
fn measured_rect_is_moved_into_main_viewport() {
    let frames = nested_frames();
    let locator = FieldLocator::new("card", &FrameRef::new(INNER), &frames);
    assert_eq!(locator.chain(), [INNER, OUTER, TOP]);
    assert_eq!(locator.current(), None);

    locator.set_measured(Rect::new(5.0, 5.0, 200.0, 30.0));
    assert_eq!(locator.current(), Some(Rect::new(115.0, 225.0, 200.0, 30.0)));
}

#[test]
fn ancestor_scroll_moves_rect_against_the_delta() {
    let mut frames = nested_frames();
    let locator = FieldLocator::new("card", &FrameRef::new(INNER), &frames);
    locator.set_measured(Rect::new(0.0, 0.0, 100.0, 20.0));

    let scrolled = frames.set_frame_info_scroll(OUTER, 0.0, 50.0);
    assert!(locator.frame_scrolled(&scrolled));
    assert_eq!(locator.current(), Some(Rect::new(110.0, 170.0, 100.0, 20.0)));

    // Scrolling back restores the original position.
    let back = frames.set_frame_info_scroll(OUTER, 0.0, 0.0);
    assert!(locator.frame_scrolled(&back));
    assert_eq!(locator.current(), Some(Rect::new(110.0, 220.0, 100.0, 20.0)));
}

#[test]
fn locator_created_after_parent_scroll_uses_scrolled_origin() {
    let mut frames = WebFrames::new();
    frames.reset(TOP);
    frames.set_frame_info(FrameInfo::child(OUTER, TOP, 0.0, 100.0));
    frames.set_frame_info_scroll(TOP, 0.0, 50.0);

    let locator = FieldLocator::new("card", &FrameRef::new(OUTER), &frames);
    locator.set_measured(Rect::new(0.0, 10.0, 100.0, 20.0));
    assert_eq!(locator.current(), Some(Rect::new(0.0, 60.0, 100.0, 20.0)));
}

#[test]
fn remeasuring_after_scroll_keeps_the_corrected_origin() {
    let mut frames = nested_frames();
    let locator = FieldLocator::new("card", &FrameRef::new(INNER), &frames);
    locator.set_measured(Rect::new(0.0, 0.0, 100.0, 20.0));

    let scrolled = frames.set_frame_info_scroll(TOP, 0.0, 40.0);
    locator.frame_scrolled(&scrolled);
    locator.set_measured(Rect::new(0.0, 0.0, 100.0, 20.0));
    assert_eq!(locator.current(), Some(Rect::new(110.0, 180.0, 100.0, 20.0)));

    // Scrolling the field's own frame changes what the page measures, not the origin.
    let own = frames.set_frame_info_scroll(INNER, 0.0, 15.0);
    assert!(locator.frame_scrolled(&own));
    locator.set_measured(Rect::new(0.0, -15.0, 100.0, 20.0));
    assert_eq!(locator.current(), Some(Rect::new(110.0, 165.0, 100.0, 20.0)));
}

#[test]
fn scroll_of_unrelated_frame_is_ignored() {
    let mut frames = nested_frames();
    frames.set_frame_info(FrameInfo::child("https://ads.example.org/", TOP, 0.0, 0.0));
    let locator = FieldLocator::new("card", &FrameRef::new(INNER), &frames);
    locator.set_measured(Rect::new(0.0, 0.0, 100.0, 20.0));

    let other = frames.set_frame_info_scroll("https://ads.example.org/", 0.0, 300.0);
    assert!(!locator.frame_scrolled(&other));
    assert_eq!(locator.current(), Some(Rect::new(110.0, 220.0, 100.0, 20.0)));
}

#[test]
fn repeated_scroll_position_does_not_notify() {
    let mut frames = nested_frames();
    let locator = FieldLocator::new("card", &FrameRef::new(INNER), &frames);
    locator.set_measured(Rect::new(0.0, 0.0, 10.0, 10.0));

    let info = frames.set_frame_info_scroll(TOP, 0.0, 25.0);
    assert!(locator.frame_scrolled(&info));
    assert!(!locator.frame_scrolled(&info));
}

#[test]
fn subscribers_see_scroll_updates() {
    let mut frames = nested_frames();
    let locator = FieldLocator::new("card", &FrameRef::new(OUTER), &frames);
    let mut updates = locator.subscribe();

    locator.set_measured(Rect::new(0.0, 0.0, 50.0, 10.0));
    assert!(updates.has_changed().unwrap());
    assert_eq!(*updates.borrow_and_update(), Some(Rect::new(100.0, 200.0, 50.0, 10.0)));

    let info = frames.set_frame_info_scroll(TOP, 40.0, 0.0);
    locator.frame_scrolled(&info);
    assert!(updates.has_changed().unwrap());
    assert_eq!(*updates.borrow_and_update(), Some(Rect::new(60.0, 200.0, 50.0, 10.0)));
}

#[tokio::test]
async fn refresh_queries_the_page_for_geometry() {
    let frames = nested_frames();
    let frame = FrameRef::new(OUTER);
    let page = ScriptedPage::new();
    page.set_fields(&frame, vec![FieldSnapshot::new("num", FieldType::Text)]);

    let locator = FieldLocator::new("num", &frame, &frames);
    assert_eq!(locator.refresh(&page).await.unwrap(), None);

    page.set_rect(&frame, "num", Rect::new(1.0, 2.0, 80.0, 16.0));
    let rect = locator.refresh(&page).await.unwrap();
    assert_eq!(rect, Some(Rect::new(101.0, 202.0, 80.0, 16.0)));
    assert_eq!(page.command_count("getElementRects"), 2);
}

#[tokio::test]
async fn failed_refresh_keeps_last_rect() {
    let frames = nested_frames();
    let frame = FrameRef::new(TOP);
    let page = ScriptedPage::new();
    page.set_fields(&frame, vec![FieldSnapshot::new("u", FieldType::Text)]);
    page.set_rect(&frame, "u", Rect::new(10.0, 10.0, 100.0, 20.0));

    let locator = FieldLocator::new("u", &frame, &frames);
    locator.refresh(&page).await.unwrap();

    page.fail_next("getElementRects", "frame detached");
    assert!(locator.refresh(&page).await.is_err());
    assert_eq!(locator.current(), Some(Rect::new(10.0, 10.0, 100.0, 20.0)));
}

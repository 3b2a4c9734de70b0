use std::collections::VecDeque;
use std::fmt::Debug;
use std::fs;
use std::io::{self, prelude::*, BufReader, BufWriter};
use std::path::Path;

use log::{debug, error};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

use super::close_stack::CloseStack;
use super::location::{DocumentLocation, LocationTracker};
use crate::io::utils::MD5HashingStream;
use crate::params::ParamLike;

const BUFFER_SIZE: usize = 10000;
const TOKEN_WINDOW_SIZE: usize = 10;
const TOKEN_DISPLAY_WIDTH: usize = 96;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Invalid(String),
    #[error("An XML error occurred while writing a replacement: {0}")]
    XMLError(
        #[from]
        #[source]
        quick_xml::Error,
    ),
    #[error("An IO error occurred while writing a replacement: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("An XML error occurred near byte {position}: {source}")]
    XMLError {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },
    #[error("An IO error occurred during rewriting: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
    #[error("Rewrite aborted in {location} at <{element}>: {message}. Recent tokens: {}", .recent.join(" "))]
    Aborted {
        location: String,
        element: String,
        message: String,
        recent: Vec<String>,
    },
}

impl From<RewriteError> for io::Error {
    fn from(value: RewriteError) -> Self {
        match value {
            RewriteError::IOError(e) => e,
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

/// What the rewriter should do with the source element a handler was shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerAction {
    /// Copy the element and its children unchanged
    PassThrough,
    /// Copy the element with these attribute values replaced or added, then
    /// its children unchanged
    OverrideAttributes(Vec<(String, String)>),
    /// The handler wrote a replacement; drop the source element and its children
    Replaced,
    /// Drop the source element and its children
    Skip,
}

/// Per-element decisions for one template dialect
pub trait RewriteHandler {
    type Location: DocumentLocation;

    /// Whether the handler must see the element's complete source subtree
    /// before deciding. A captured subtree is replayed verbatim if passed through.
    fn wants_subtree(&self, _location: Self::Location, _element: &BytesStart<'_>) -> bool {
        false
    }

    fn handle_start<W: Write>(
        &mut self,
        location: Self::Location,
        element: &BytesStart<'_>,
        subtree: Option<&[Event<'static>]>,
        sink: &mut XmlSink<W>,
    ) -> Result<HandlerAction, HandlerError>;
}

/// The output side of a rewrite. Everything written is indented uniformly
/// and hashed as it streams out.
pub struct XmlSink<W: Write> {
    handle: Writer<BufWriter<MD5HashingStream<W>>>,
}

impl<W: Write> Debug for XmlSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlSink").field("handle", &"...").finish()
    }
}

impl<W: Write> XmlSink<W> {
    pub fn new(file: W) -> Self {
        let handle = BufWriter::with_capacity(BUFFER_SIZE, MD5HashingStream::new(file));
        Self {
            handle: Writer::new_with_indent(handle, b' ', 2),
        }
    }

    pub fn write_event<'a, E: AsRef<Event<'a>>>(&mut self, event: E) -> Result<(), quick_xml::Error> {
        self.handle.write_event(event)
    }

    pub fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), quick_xml::Error> {
        let mut elt = BytesStart::new(name);
        elt.extend_attributes(attributes.iter().copied());
        self.handle.write_event(Event::Start(elt))
    }

    pub fn end(&mut self, name: &str) -> Result<(), quick_xml::Error> {
        self.handle.write_event(Event::End(BytesEnd::new(name)))
    }

    pub fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), quick_xml::Error> {
        let mut elt = BytesStart::new(name);
        elt.extend_attributes(attributes.iter().copied());
        self.handle.write_event(Event::Empty(elt))
    }

    /// Write `<name>text</name>`, escaping `text`
    pub fn text_element(&mut self, name: &str, text: &str) -> Result<(), quick_xml::Error> {
        self.start(name, &[])?;
        if !text.is_empty() {
            self.handle.write_event(Event::Text(BytesText::new(text)))?;
        }
        self.end(name)
    }

    /// Write a labelled `cvParam` element in the report dialect's style
    pub fn write_cv_param<P: ParamLike>(&mut self, param: &P) -> Result<(), quick_xml::Error> {
        let label = param
            .controlled_vocabulary()
            .map(|cv| cv.prefix())
            .unwrap_or_default();
        let mut elt = BytesStart::new("cvParam");
        elt.push_attribute(("cvLabel", label));
        elt.push_attribute(("accession", param.accession().unwrap_or_default()));
        elt.push_attribute(("name", param.name()));
        if !param.value().is_empty() {
            elt.push_attribute(("value", param.value()));
        }
        self.handle.write_event(Event::Empty(elt))
    }

    /// Flush everything, returning the destination and the MD5 checksum of the
    /// bytes written to it
    pub fn finish(self) -> io::Result<(W, String)> {
        let mut buffered = self.handle.into_inner();
        buffered.flush()?;
        let hashing = buffered.into_inner().map_err(|e| e.into_error())?;
        let checksum = format!("{:x}", hashing.compute());
        Ok((hashing.into_inner(), checksum))
    }
}

/// The last few tokens read from the source, kept for error reports
#[derive(Debug, Default, Clone)]
struct TokenWindow {
    tokens: VecDeque<String>,
}

impl TokenWindow {
    fn push(&mut self, mut token: String) {
        if let Some((cut, _)) = token.char_indices().nth(TOKEN_DISPLAY_WIDTH) {
            token.truncate(cut);
            token.push_str("...");
        }
        if self.tokens.len() == TOKEN_WINDOW_SIZE {
            self.tokens.pop_front();
        }
        self.tokens.push_back(token);
    }

    fn snapshot(&self) -> Vec<String> {
        self.tokens.iter().cloned().collect()
    }
}

fn describe(event: &Event<'_>) -> String {
    match event {
        Event::Start(e) => format!("<{}>", String::from_utf8_lossy(e)),
        Event::Empty(e) => format!("<{}/>", String::from_utf8_lossy(e)),
        Event::End(e) => format!("</{}>", String::from_utf8_lossy(e.name().as_ref())),
        Event::Text(e) => String::from_utf8_lossy(e).to_string(),
        Event::Comment(e) => format!("<!--{}-->", String::from_utf8_lossy(e)),
        Event::CData(e) => format!("<![CDATA[{}]]>", String::from_utf8_lossy(e)),
        other => format!("{other:?}"),
    }
}

/// Copy `element` with the given attribute values replaced, appending any
/// overrides the element did not already carry. Untouched attributes keep
/// their original escaping.
pub fn override_attributes(
    element: &BytesStart<'_>,
    overrides: &[(String, String)],
) -> Result<BytesStart<'static>, quick_xml::Error> {
    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let mut updated = BytesStart::new(name);
    let mut applied = vec![false; overrides.len()];
    for attr in element.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        match overrides.iter().position(|(k, _)| k.as_bytes() == key) {
            Some(i) => {
                applied[i] = true;
                updated.push_attribute((overrides[i].0.as_str(), overrides[i].1.as_str()));
            }
            None => updated.push_attribute((key, attr.value.as_ref())),
        }
    }
    for ((key, value), done) in overrides.iter().zip(applied) {
        if !done {
            updated.push_attribute((key.as_str(), value.as_str()));
        }
    }
    Ok(updated)
}

/// Read an attribute's unescaped value from a source element
pub fn attribute_value(element: &BytesStart<'_>, key: &str) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// The result of a completed rewrite
#[derive(Debug)]
pub struct RewriteOutput<W, H> {
    pub handle: W,
    /// MD5 checksum of the rewritten document, lowercase hexadecimal
    pub checksum: String,
    pub handler: H,
}

/// Copies a template document from `R` to `W` one token at a time, consulting
/// a [`RewriteHandler`] at every element start.
///
/// Only the open elements' names and a handful of recent tokens are held in
/// memory; subtrees are buffered only when a handler asks to see one.
pub struct StreamingRewriter<R: BufRead, W: Write, H: RewriteHandler> {
    reader: Reader<R>,
    sink: XmlSink<W>,
    handler: H,
    tracker: LocationTracker<H::Location>,
    closes: CloseStack,
    window: TokenWindow,
    depth: usize,
    scratch: Vec<u8>,
}

impl<R: BufRead, W: Write, H: RewriteHandler> StreamingRewriter<R, W, H> {
    pub fn new(source: R, destination: W, handler: H) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);
        Self {
            reader,
            sink: XmlSink::new(destination),
            handler,
            tracker: LocationTracker::new(),
            closes: CloseStack::new(),
            window: TokenWindow::default(),
            depth: 0,
            scratch: Vec::new(),
        }
    }

    fn xml_error(&self, source: quick_xml::Error) -> RewriteError {
        RewriteError::XMLError {
            position: self.reader.buffer_position(),
            source,
        }
    }

    fn emit<'a, E: AsRef<Event<'a>>>(&mut self, event: E) -> Result<(), RewriteError> {
        match self.sink.write_event(event) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.xml_error(e)),
        }
    }

    fn close_from(&mut self, depth: usize) -> Result<(), RewriteError> {
        for name in self.closes.close_from(depth) {
            self.emit(Event::End(BytesEnd::new(name)))?;
        }
        Ok(())
    }

    fn abort(&self, location: H::Location, element: &[u8], err: HandlerError) -> RewriteError {
        let element = String::from_utf8_lossy(element).into_owned();
        let recent = self.window.snapshot();
        error!(
            "Rewrite aborted in {location} at <{element}>: {err}\n\t{}",
            recent.join("\n\t")
        );
        RewriteError::Aborted {
            location: location.to_string(),
            element,
            message: err.to_string(),
            recent,
        }
    }

    /// Read the rest of the current element's subtree, excluding its end tag
    fn capture_subtree(&mut self) -> Result<Vec<Event<'static>>, RewriteError> {
        let mut events = Vec::new();
        let mut nesting = 0usize;
        loop {
            let event = match self.reader.read_event_into(&mut self.scratch) {
                Ok(event) => event.into_owned(),
                Err(e) => return Err(self.xml_error(e)),
            };
            self.scratch.clear();
            match &event {
                Event::Start(_) => nesting += 1,
                Event::End(_) if nesting == 0 => {
                    self.window.push(describe(&event));
                    return Ok(events);
                }
                Event::End(_) => nesting -= 1,
                Event::Eof => {
                    return Err(self.xml_error(quick_xml::Error::UnexpectedEof(
                        "captured element".into(),
                    )))
                }
                _ => {}
            }
            self.window.push(describe(&event));
            events.push(event);
        }
    }

    fn skip_subtree(&mut self, element: &BytesStart<'_>) -> Result<(), RewriteError> {
        let result = self.reader.read_to_end_into(element.name(), &mut self.scratch);
        self.scratch.clear();
        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(self.xml_error(e)),
        }
    }

    fn write_start(
        &mut self,
        element: &BytesStart<'_>,
        action: &HandlerAction,
        empty: bool,
    ) -> Result<(), RewriteError> {
        let start = match action {
            HandlerAction::OverrideAttributes(overrides) => match override_attributes(element, overrides) {
                Ok(start) => start,
                Err(e) => return Err(self.xml_error(e)),
            },
            _ => element.to_owned(),
        };
        if empty {
            self.emit(Event::Empty(start))
        } else {
            self.emit(Event::Start(start))
        }
    }

    fn start_element(&mut self, element: BytesStart<'_>, empty: bool) -> Result<(), RewriteError> {
        let name = element.name().as_ref().to_vec();
        self.window.push(describe(&if empty {
            Event::Empty(element.borrow())
        } else {
            Event::Start(element.borrow())
        }));

        let element_depth = self.depth + 1;
        self.close_from(element_depth)?;

        let location = if empty {
            self.tracker.visit(&name)
        } else {
            self.tracker.enter(&name)
        };

        let subtree = if self.handler.wants_subtree(location, &element) {
            if empty {
                Some(Vec::new())
            } else {
                Some(self.capture_subtree()?)
            }
        } else {
            None
        };

        let action = match self
            .handler
            .handle_start(location, &element, subtree.as_deref(), &mut self.sink)
        {
            Ok(action) => action,
            Err(err) => return Err(self.abort(location, &name, err)),
        };

        match (subtree, &action) {
            (Some(events), HandlerAction::PassThrough | HandlerAction::OverrideAttributes(_)) => {
                self.write_start(&element, &action, empty)?;
                if !empty {
                    for event in events.iter() {
                        self.emit(event)?;
                    }
                    self.emit(Event::End(element.to_end()))?;
                    self.tracker.leave();
                }
            }
            (Some(_), HandlerAction::Replaced | HandlerAction::Skip) => {
                debug!("Dropped captured <{}> in {location}", String::from_utf8_lossy(&name));
                if !empty {
                    self.tracker.leave();
                }
            }
            (None, HandlerAction::PassThrough | HandlerAction::OverrideAttributes(_)) => {
                self.write_start(&element, &action, empty)?;
                if !empty {
                    self.depth = element_depth;
                    self.closes
                        .push(element_depth, String::from_utf8_lossy(&name).into_owned());
                }
            }
            (None, HandlerAction::Replaced | HandlerAction::Skip) => {
                debug!("Skipping source <{}> in {location}", String::from_utf8_lossy(&name));
                if !empty {
                    self.skip_subtree(&element)?;
                    self.tracker.leave();
                }
            }
        }
        Ok(())
    }

    fn end_element(&mut self, element: BytesEnd<'_>) -> Result<(), RewriteError> {
        self.window.push(describe(&Event::End(element)));
        self.close_from(self.depth)?;
        self.tracker.leave();
        self.depth = self.depth.saturating_sub(1);
        Ok(())
    }

    fn text(&mut self, text: BytesText<'_>) -> Result<(), RewriteError> {
        self.close_from(self.depth + 1)?;
        let content: &[u8] = &text;
        if let Some(rest) = content.strip_prefix(UTF8_BOM) {
            if rest.is_empty() {
                return Ok(());
            }
            let rest = String::from_utf8_lossy(rest).into_owned();
            self.window.push(rest.clone());
            self.emit(Event::Text(BytesText::from_escaped(rest)))
        } else {
            self.window.push(String::from_utf8_lossy(content).into_owned());
            self.emit(Event::Text(text))
        }
    }

    /// Run the rewrite to the end of the source document
    pub fn rewrite(mut self) -> Result<RewriteOutput<W, H>, RewriteError> {
        let mut buffer = Vec::new();
        loop {
            let event = match self.reader.read_event_into(&mut buffer) {
                Ok(event) => event,
                Err(e) => return Err(self.xml_error(e)),
            };
            match event {
                Event::Start(e) => self.start_element(e, false)?,
                Event::Empty(e) => self.start_element(e, true)?,
                Event::End(e) => self.end_element(e)?,
                Event::Text(e) => self.text(e)?,
                Event::Eof => break,
                other => {
                    self.window.push(describe(&other));
                    self.emit(other)?;
                }
            }
            buffer.clear();
        }
        self.close_from(0)?;
        let (handle, checksum) = self.sink.finish()?;
        Ok(RewriteOutput {
            handle,
            checksum,
            handler: self.handler,
        })
    }
}

/// Rewrite the template at `template` into a new file at `destination`,
/// returning the handler and the output's checksum
pub fn rewrite_file<H: RewriteHandler>(
    template: &Path,
    destination: &Path,
    handler: H,
) -> Result<(H, String), RewriteError> {
    let source = BufReader::new(fs::File::open(template)?);
    let output = fs::File::create(destination)?;
    let result = StreamingRewriter::new(source, output, handler).rewrite()?;
    result.handle.sync_all()?;
    Ok((result.handler, result.checksum))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::rewrite::location::ReportLocation;
    use std::io::Cursor;

    #[derive(Debug, Default)]
    struct PassThrough;

    impl RewriteHandler for PassThrough {
        type Location = ReportLocation;

        fn handle_start<W: Write>(
            &mut self,
            _location: Self::Location,
            _element: &BytesStart<'_>,
            _subtree: Option<&[Event<'static>]>,
            _sink: &mut XmlSink<W>,
        ) -> Result<HandlerAction, HandlerError> {
            Ok(HandlerAction::PassThrough)
        }
    }

    /// Reads every event of a document into owned events, dropping whitespace
    fn events(document: &[u8]) -> Vec<Event<'static>> {
        let mut reader = Reader::from_reader(document);
        reader.trim_text(true);
        let mut buf = Vec::new();
        let mut events = Vec::new();
        loop {
            match reader.read_event_into(&mut buf).unwrap() {
                Event::Eof => break,
                e => events.push(e.into_owned()),
            }
            buf.clear();
        }
        events
    }

    fn rewrite<H: RewriteHandler>(document: &str, handler: H) -> Result<(String, RewriteOutput<Vec<u8>, H>), RewriteError> {
        let rewriter = StreamingRewriter::new(Cursor::new(document.as_bytes()), Vec::new(), handler);
        let mut output = rewriter.rewrite()?;
        let text = String::from_utf8(std::mem::take(&mut output.handle)).unwrap();
        Ok((text, output))
    }

    const PLAIN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root a="1 &amp; 2">
  <!-- note -->
  <child b="x"><leaf>some &lt;text&gt;</leaf><empty c="y"/></child>
  <other>tail</other>
</root>
"#;

    #[test]
    fn test_round_trip_without_triggers() -> Result<(), RewriteError> {
        let (text, output) = rewrite(PLAIN, PassThrough)?;
        assert_eq!(events(PLAIN.as_bytes()), events(text.as_bytes()));
        assert!(text.contains(r#"a="1 &amp; 2""#));
        assert!(text.contains("some &lt;text&gt;"));
        assert_eq!(output.checksum, format!("{:x}", md5::compute(text.as_bytes())));
        Ok(())
    }

    #[test]
    fn test_no_byte_order_mark() -> Result<(), RewriteError> {
        let with_bom = format!("\u{FEFF}{PLAIN}");
        let (text, _) = rewrite(&with_bom, PassThrough)?;
        assert!(!text.as_bytes().starts_with(UTF8_BOM));
        assert!(text.starts_with("<?xml"));
        Ok(())
    }

    #[derive(Debug, Default)]
    struct Scripted {
        captured: Vec<String>,
    }

    impl RewriteHandler for Scripted {
        type Location = ReportLocation;

        fn wants_subtree(&self, _location: Self::Location, element: &BytesStart<'_>) -> bool {
            element.name().as_ref() == b"capture"
        }

        fn handle_start<W: Write>(
            &mut self,
            location: Self::Location,
            element: &BytesStart<'_>,
            subtree: Option<&[Event<'static>]>,
            sink: &mut XmlSink<W>,
        ) -> Result<HandlerAction, HandlerError> {
            match element.name().as_ref() {
                b"capture" => {
                    self.captured = subtree
                        .unwrap_or_default()
                        .iter()
                        .map(describe)
                        .collect();
                    Ok(HandlerAction::PassThrough)
                }
                b"rename" => Ok(HandlerAction::OverrideAttributes(vec![
                    ("label".into(), "new & improved".into()),
                    ("extra".into(), "1".into()),
                ])),
                b"drop" => Ok(HandlerAction::Skip),
                b"Identifications" => {
                    assert_eq!(location, ReportLocation::Identifications);
                    sink.start("Identifications", &[])?;
                    sink.text_element("Generated", "yes")?;
                    sink.end("Identifications")?;
                    Ok(HandlerAction::Replaced)
                }
                b"explode" => Err(HandlerError::Invalid("cannot build replacement".into())),
                _ => Ok(HandlerAction::PassThrough),
            }
        }
    }

    #[test]
    fn test_handler_actions() -> Result<(), RewriteError> {
        let doc = r#"<root>
  <rename label="old" keep="a&amp;b"><inner>text</inner></rename>
  <drop><deep><deeper x="1"/></deep></drop>
  <capture><name>MSGF</name><version>1.0</version></capture>
  <Identifications><stale>1</stale></Identifications>
  <after/>
</root>"#;
        let (text, output) = rewrite(doc, Scripted::default())?;
        let expected = r#"<root>
  <rename label="new &amp; improved" keep="a&amp;b" extra="1">
    <inner>text</inner>
  </rename>
  <capture>
    <name>MSGF</name>
    <version>1.0</version>
  </capture>
  <Identifications>
    <Generated>yes</Generated>
  </Identifications>
  <after/>
</root>"#;
        assert_eq!(events(text.as_bytes()), events(expected.as_bytes()));
        assert!(!text.contains("deeper"));
        assert!(!text.contains("stale"));
        assert_eq!(
            output.handler.captured,
            vec!["<name>", "MSGF", "</name>", "<version>", "1.0", "</version>"]
        );
        Ok(())
    }

    #[test]
    fn test_abort_reports_recent_tokens() {
        let doc = r#"<root><a x="1"/><b>hello</b><explode/><c/></root>"#;
        match rewrite(doc, Scripted::default()) {
            Err(RewriteError::Aborted {
                element,
                message,
                recent,
                ..
            }) => {
                assert_eq!(element, "explode");
                assert_eq!(message, "cannot build replacement");
                assert_eq!(recent.last().map(|s| s.as_str()), Some("<explode/>"));
                assert!(recent.contains(&"hello".to_string()));
            }
            other => panic!("Expected an aborted rewrite, got {:?}", other.map(|(t, _)| t)),
        }
    }

    #[test]
    fn test_token_window_is_bounded() {
        let mut window = TokenWindow::default();
        for i in 0..25 {
            window.push(format!("t{i}"));
        }
        let tokens = window.snapshot();
        assert_eq!(tokens.len(), TOKEN_WINDOW_SIZE);
        assert_eq!(tokens[0], "t15");
        window.push("x".repeat(200));
        assert!(window.snapshot().last().unwrap().ends_with("..."));
    }
}

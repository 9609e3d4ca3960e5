use crate::error::{Result, VastError};
use crate::models::*;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Parse a VAST XML string into a Vast struct
///
/// The root element must be `<VAST>`. A missing `version` attribute is
/// accepted and left empty so formatters can apply their own default.
pub fn parse_vast(xml: &str) -> Result<Vast> {
    VastParser::new(xml).parse()
}

/// Parse VAST XML from raw bytes
pub fn parse_vast_bytes(data: &[u8]) -> Result<Vast> {
    let xml = std::str::from_utf8(data)
        .map_err(|e| VastError::Validation(format!("VAST is not valid UTF-8: {}", e)))?;
    parse_vast(xml)
}

/// Event-driven VAST reader
///
/// Holds on to the source text so elements without a typed field can be
/// copied out verbatim from their byte span.
struct VastParser<'a> {
    reader: Reader<&'a [u8]>,
    xml: &'a str,
}

impl<'a> VastParser<'a> {
    fn new(xml: &'a str) -> Self {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        VastParser { reader, xml }
    }

    fn parse(mut self) -> Result<Vast> {
        loop {
            match self.reader.read_event()? {
                Event::Start(e) if e.name().as_ref() == b"VAST" => {
                    let mut vast = Vast {
                        version: attr(&e, b"version").unwrap_or_default(),
                        ..Default::default()
                    };
                    self.parse_vast_children(&mut vast)?;
                    return Ok(vast);
                }
                Event::Empty(e) if e.name().as_ref() == b"VAST" => {
                    return Ok(Vast {
                        version: attr(&e, b"version").unwrap_or_default(),
                        ..Default::default()
                    });
                }
                Event::Start(e) | Event::Empty(e) => {
                    return Err(VastError::MissingField(format!(
                        "VAST root element (found <{}>)",
                        String::from_utf8_lossy(e.name().as_ref())
                    )));
                }
                Event::Eof => return Err(VastError::MissingField("VAST root element".to_string())),
                _ => (),
            }
        }
    }

    /// Returns the next child element of the current element, or `None`
    /// once its end tag is reached. The flag is true for self-closing tags.
    fn next_child(&mut self, parent: &str) -> Result<Option<(BytesStart<'a>, bool)>> {
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => return Ok(Some((e, false))),
                Event::Empty(e) => return Ok(Some((e, true))),
                Event::End(_) => return Ok(None),
                Event::Eof => return Err(unexpected_eof(parent)),
                _ => (),
            }
        }
    }

    fn parse_vast_children(&mut self, vast: &mut Vast) -> Result<()> {
        while let Some((e, empty)) = self.next_child("VAST")? {
            match e.name().as_ref() {
                b"Ad" => vast.ads.push(self.parse_ad(&e, empty)?),
                b"Error" => vast.error = Some(self.text(empty)?),
                _ => vast.extra_elements.push(self.capture(&e, empty)?),
            }
        }
        Ok(())
    }

    fn parse_ad(&mut self, start: &BytesStart, empty: bool) -> Result<Ad> {
        let mut ad = Ad {
            id: attr(start, b"id"),
            sequence: attr(start, b"sequence").and_then(|v| v.trim().parse().ok()),
            conditional_ad: attr(start, b"conditionalAd").map(|v| v.eq_ignore_ascii_case("true")),
            ..Default::default()
        };
        if empty {
            return Ok(ad);
        }

        while let Some((e, empty)) = self.next_child("Ad")? {
            match e.name().as_ref() {
                b"InLine" => ad.inline = Some(self.parse_inline(empty)?),
                b"Wrapper" => ad.wrapper = Some(self.parse_wrapper(&e, empty)?),
                _ => ad.extra_elements.push(self.capture(&e, empty)?),
            }
        }

        Ok(ad)
    }

    fn parse_inline(&mut self, empty: bool) -> Result<InLine> {
        let mut inline = InLine::default();
        if empty {
            return Ok(inline);
        }

        while let Some((e, empty)) = self.next_child("InLine")? {
            match e.name().as_ref() {
                b"AdSystem" => inline.ad_system = Some(self.parse_ad_system(&e, empty)?),
                b"AdTitle" => inline.ad_title = self.text(empty)?,
                b"Impression" => inline.impressions.push(self.parse_impression(&e, empty)?),
                b"Description" => inline.description = Some(self.text(empty)?),
                b"Advertiser" => inline.advertiser = Some(self.text(empty)?),
                b"Pricing" => inline.pricing = Some(self.parse_pricing(&e, empty)?),
                b"Error" => inline.errors.push(self.text(empty)?),
                b"Category" => inline.categories.push(Category {
                    authority: attr(&e, b"authority"),
                    value: self.text(empty)?,
                }),
                b"Creatives" => inline.creatives.extend(self.parse_creatives(empty)?),
                b"Extensions" => inline.extensions.extend(self.parse_extensions(empty)?),
                _ => inline.extra_elements.push(self.capture(&e, empty)?),
            }
        }

        Ok(inline)
    }

    fn parse_wrapper(&mut self, start: &BytesStart, empty: bool) -> Result<Wrapper> {
        let mut wrapper = Wrapper {
            follow_additional_wrappers: attr(start, b"followAdditionalWrappers").map(|v| flag(&v)),
            ..Default::default()
        };
        if empty {
            return Ok(wrapper);
        }

        while let Some((e, empty)) = self.next_child("Wrapper")? {
            match e.name().as_ref() {
                b"AdSystem" => wrapper.ad_system = Some(self.parse_ad_system(&e, empty)?),
                b"VASTAdTagURI" => wrapper.vast_ad_tag_uri = self.text(empty)?,
                b"Impression" => wrapper.impressions.push(self.parse_impression(&e, empty)?),
                b"Error" => wrapper.errors.push(self.text(empty)?),
                b"Creatives" => wrapper.creatives.extend(self.parse_creatives(empty)?),
                b"Extensions" => wrapper.extensions.extend(self.parse_extensions(empty)?),
                _ => wrapper.extra_elements.push(self.capture(&e, empty)?),
            }
        }

        Ok(wrapper)
    }

    fn parse_ad_system(&mut self, start: &BytesStart, empty: bool) -> Result<AdSystem> {
        Ok(AdSystem {
            version: attr(start, b"version"),
            name: self.text(empty)?,
        })
    }

    fn parse_impression(&mut self, start: &BytesStart, empty: bool) -> Result<Impression> {
        Ok(Impression {
            id: attr(start, b"id"),
            url: self.text(empty)?,
        })
    }

    fn parse_pricing(&mut self, start: &BytesStart, empty: bool) -> Result<Pricing> {
        Ok(Pricing {
            model: attr(start, b"model").unwrap_or_default(),
            currency: attr(start, b"currency").unwrap_or_default(),
            value: self.text(empty)?,
        })
    }

    fn parse_extensions(&mut self, empty: bool) -> Result<Vec<Extension>> {
        let mut extensions = Vec::new();
        if empty {
            return Ok(extensions);
        }

        while let Some((e, empty)) = self.next_child("Extensions")? {
            if e.name().as_ref() != b"Extension" {
                self.skip(&e, empty)?;
                continue;
            }
            let content = if empty {
                String::new()
            } else {
                self.inner_xml(&e)?.trim().to_string()
            };
            extensions.push(Extension {
                r#type: attr(&e, b"type"),
                content,
            });
        }

        Ok(extensions)
    }

    fn parse_creatives(&mut self, empty: bool) -> Result<Vec<Creative>> {
        let mut creatives = Vec::new();
        if empty {
            return Ok(creatives);
        }

        while let Some((e, empty)) = self.next_child("Creatives")? {
            match e.name().as_ref() {
                b"Creative" => creatives.push(self.parse_creative(&e, empty)?),
                _ => self.skip(&e, empty)?,
            }
        }

        Ok(creatives)
    }

    fn parse_creative(&mut self, start: &BytesStart, empty: bool) -> Result<Creative> {
        let mut creative = Creative {
            id: attr(start, b"id"),
            sequence: attr(start, b"sequence").and_then(|v| v.trim().parse().ok()),
            ad_id: attr(start, b"adId").or_else(|| attr(start, b"AdID")),
            api_framework: attr(start, b"apiFramework"),
            ..Default::default()
        };
        if empty {
            return Ok(creative);
        }

        while let Some((e, empty)) = self.next_child("Creative")? {
            match e.name().as_ref() {
                b"Linear" => creative.linear = Some(self.parse_linear(&e, empty)?),
                _ => creative.extra_elements.push(self.capture(&e, empty)?),
            }
        }

        Ok(creative)
    }

    fn parse_linear(&mut self, start: &BytesStart, empty: bool) -> Result<Linear> {
        let mut linear = Linear {
            skip_offset: attr(start, b"skipoffset"),
            ..Default::default()
        };
        if empty {
            return Ok(linear);
        }

        while let Some((e, empty)) = self.next_child("Linear")? {
            match e.name().as_ref() {
                b"Duration" => linear.duration = self.text(empty)?,
                b"MediaFiles" => self.parse_media_files(&mut linear, empty)?,
                _ => linear.extra_elements.push(self.capture(&e, empty)?),
            }
        }

        Ok(linear)
    }

    fn parse_media_files(&mut self, linear: &mut Linear, empty: bool) -> Result<()> {
        if empty {
            return Ok(());
        }

        while let Some((e, empty)) = self.next_child("MediaFiles")? {
            match e.name().as_ref() {
                b"MediaFile" => linear.media_files.push(self.parse_media_file(&e, empty)?),
                _ => linear.media_files_extra.push(self.capture(&e, empty)?),
            }
        }

        Ok(())
    }

    fn parse_media_file(&mut self, start: &BytesStart, empty: bool) -> Result<MediaFile> {
        Ok(MediaFile {
            id: attr(start, b"id"),
            delivery: attr(start, b"delivery"),
            mime_type: attr(start, b"type"),
            width: attr(start, b"width").and_then(|v| v.trim().parse().ok()),
            height: attr(start, b"height").and_then(|v| v.trim().parse().ok()),
            codec: attr(start, b"codec"),
            bitrate: attr(start, b"bitrate").and_then(|v| v.trim().parse().ok()),
            min_bitrate: attr(start, b"minBitrate").and_then(|v| v.trim().parse().ok()),
            max_bitrate: attr(start, b"maxBitrate").and_then(|v| v.trim().parse().ok()),
            scalable: attr(start, b"scalable").map(|v| flag(&v)),
            maintain_aspect_ratio: attr(start, b"maintainAspectRatio").map(|v| flag(&v)),
            api_framework: attr(start, b"apiFramework"),
            url: self.text(empty)?,
        })
    }

    /// Reads the text content of the current element, joining text and
    /// CDATA sections. Nested elements are ignored.
    fn text(&mut self, empty: bool) -> Result<String> {
        let mut text = String::new();
        if empty {
            return Ok(text);
        }

        loop {
            match self.reader.read_event()? {
                Event::Text(e) => text.push_str(&e.unescape()?),
                Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
                Event::Start(e) => {
                    self.reader.read_to_end(e.name())?;
                }
                Event::End(_) => break,
                Event::Eof => return Err(unexpected_eof("text element")),
                _ => (),
            }
        }

        Ok(text.trim().to_string())
    }

    /// Returns the source text between the start tag and its matching end tag
    fn inner_xml(&mut self, start: &BytesStart) -> Result<&'a str> {
        let span = self.reader.read_to_end(start.name())?;
        Ok(self
            .xml
            .get(span.start as usize..span.end as usize)
            .unwrap_or_default())
    }

    /// Copies a whole element, tags included, out of the source text
    fn capture(&mut self, start: &BytesStart, empty: bool) -> Result<String> {
        let head = String::from_utf8_lossy(start);
        if empty {
            return Ok(format!("<{}/>", head));
        }
        let inner = self.inner_xml(start)?;
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        Ok(format!("<{}>{}</{}>", head, inner, name))
    }

    fn skip(&mut self, start: &BytesStart, empty: bool) -> Result<()> {
        if !empty {
            self.reader.read_to_end(start.name())?;
        }
        Ok(())
    }
}

/// Reads an attribute value, unescaping entities
fn attr(start: &BytesStart, name: &[u8]) -> Option<String> {
    start
        .try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

/// xs:boolean: `true` or `1`
fn flag(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn unexpected_eof(element: &str) -> VastError {
    VastError::Validation(format!("Unexpected end of file inside <{}>", element))
}

use crate::error::Result;
use crate::models::*;
use quick_xml::escape::{escape, partial_escape};
use std::fmt::Write;

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

impl Vast {
    /// Serialize to an indented XML string with a declaration header
    pub fn to_xml(&self) -> Result<String> {
        vast_to_xml(self)
    }

    /// Serialize to XML bytes
    pub fn marshal(&self) -> Result<Vec<u8>> {
        Ok(vast_to_xml(self)?.into_bytes())
    }
}

/// Convert a Vast struct to XML
pub fn vast_to_xml(vast: &Vast) -> Result<String> {
    let mut xml = String::with_capacity(1024);
    xml.push_str(XML_HEADER);

    let version = if vast.version.is_empty() {
        DEFAULT_VAST_VERSION
    } else {
        vast.version.as_str()
    };
    writeln!(xml, "<VAST version=\"{}\">", escape(version))?;

    if let Some(error) = &vast.error {
        writeln!(xml, "  <Error>{}</Error>", cdata(error))?;
    }

    for ad in &vast.ads {
        write_ad(&mut xml, ad)?;
    }
    write_raw(&mut xml, &vast.extra_elements, 2);

    xml.push_str("</VAST>\n");
    Ok(xml)
}

fn write_ad(xml: &mut String, ad: &Ad) -> Result<()> {
    xml.push_str("  <Ad");
    if let Some(id) = &ad.id {
        write!(xml, " id=\"{}\"", escape(id))?;
    }
    if let Some(sequence) = ad.sequence.filter(|s| *s > 0) {
        write!(xml, " sequence=\"{}\"", sequence)?;
    }
    if let Some(conditional_ad) = ad.conditional_ad {
        write!(xml, " conditionalAd=\"{}\"", conditional_ad)?;
    }
    xml.push_str(">\n");

    if let Some(inline) = &ad.inline {
        write_inline(xml, inline)?;
    } else if let Some(wrapper) = &ad.wrapper {
        write_wrapper(xml, wrapper)?;
    }
    write_raw(xml, &ad.extra_elements, 4);

    xml.push_str("  </Ad>\n");
    Ok(())
}

fn write_inline(xml: &mut String, inline: &InLine) -> Result<()> {
    xml.push_str("    <InLine>\n");

    if let Some(ad_system) = &inline.ad_system {
        write_ad_system(xml, ad_system)?;
    }
    if !inline.ad_title.is_empty() {
        writeln!(xml, "      <AdTitle>{}</AdTitle>", partial_escape(&inline.ad_title))?;
    }
    if let Some(description) = &inline.description {
        writeln!(xml, "      <Description>{}</Description>", partial_escape(description))?;
    }
    if let Some(advertiser) = &inline.advertiser {
        writeln!(xml, "      <Advertiser>{}</Advertiser>", partial_escape(advertiser))?;
    }
    if let Some(pricing) = &inline.pricing {
        writeln!(
            xml,
            "      <Pricing model=\"{}\" currency=\"{}\">{}</Pricing>",
            escape(&pricing.model),
            escape(&pricing.currency),
            partial_escape(&pricing.value)
        )?;
    }
    write_impressions(xml, &inline.impressions)?;
    for error in &inline.errors {
        writeln!(xml, "      <Error>{}</Error>", cdata(error))?;
    }
    for category in &inline.categories {
        xml.push_str("      <Category");
        if let Some(authority) = &category.authority {
            write!(xml, " authority=\"{}\"", escape(authority))?;
        }
        writeln!(xml, ">{}</Category>", partial_escape(&category.value))?;
    }
    write_raw(xml, &inline.extra_elements, 6);
    write_creatives(xml, &inline.creatives)?;
    write_extensions(xml, &inline.extensions)?;

    xml.push_str("    </InLine>\n");
    Ok(())
}

fn write_wrapper(xml: &mut String, wrapper: &Wrapper) -> Result<()> {
    xml.push_str("    <Wrapper");
    if let Some(follow) = wrapper.follow_additional_wrappers {
        write!(xml, " followAdditionalWrappers=\"{}\"", follow)?;
    }
    xml.push_str(">\n");

    if let Some(ad_system) = &wrapper.ad_system {
        write_ad_system(xml, ad_system)?;
    }
    writeln!(
        xml,
        "      <VASTAdTagURI>{}</VASTAdTagURI>",
        cdata(&wrapper.vast_ad_tag_uri)
    )?;
    write_impressions(xml, &wrapper.impressions)?;
    for error in &wrapper.errors {
        writeln!(xml, "      <Error>{}</Error>", cdata(error))?;
    }
    write_raw(xml, &wrapper.extra_elements, 6);
    write_creatives(xml, &wrapper.creatives)?;
    write_extensions(xml, &wrapper.extensions)?;

    xml.push_str("    </Wrapper>\n");
    Ok(())
}

fn write_ad_system(xml: &mut String, ad_system: &AdSystem) -> Result<()> {
    xml.push_str("      <AdSystem");
    if let Some(version) = &ad_system.version {
        write!(xml, " version=\"{}\"", escape(version))?;
    }
    writeln!(xml, ">{}</AdSystem>", partial_escape(&ad_system.name))?;
    Ok(())
}

fn write_impressions(xml: &mut String, impressions: &[Impression]) -> Result<()> {
    for impression in impressions {
        xml.push_str("      <Impression");
        if let Some(id) = &impression.id {
            write!(xml, " id=\"{}\"", escape(id))?;
        }
        writeln!(xml, ">{}</Impression>", cdata(&impression.url))?;
    }
    Ok(())
}

fn write_creatives(xml: &mut String, creatives: &[Creative]) -> Result<()> {
    if creatives.is_empty() {
        return Ok(());
    }

    xml.push_str("      <Creatives>\n");
    for creative in creatives {
        write_creative(xml, creative)?;
    }
    xml.push_str("      </Creatives>\n");
    Ok(())
}

fn write_creative(xml: &mut String, creative: &Creative) -> Result<()> {
    xml.push_str("        <Creative");
    if let Some(id) = &creative.id {
        write!(xml, " id=\"{}\"", escape(id))?;
    }
    if let Some(sequence) = creative.sequence {
        write!(xml, " sequence=\"{}\"", sequence)?;
    }
    if let Some(ad_id) = &creative.ad_id {
        write!(xml, " adId=\"{}\"", escape(ad_id))?;
    }
    if let Some(api_framework) = &creative.api_framework {
        write!(xml, " apiFramework=\"{}\"", escape(api_framework))?;
    }
    xml.push_str(">\n");

    if let Some(linear) = &creative.linear {
        write_linear(xml, linear)?;
    }
    write_raw(xml, &creative.extra_elements, 10);

    xml.push_str("        </Creative>\n");
    Ok(())
}

fn write_linear(xml: &mut String, linear: &Linear) -> Result<()> {
    xml.push_str("          <Linear");
    if let Some(skip_offset) = &linear.skip_offset {
        write!(xml, " skipoffset=\"{}\"", escape(skip_offset))?;
    }
    xml.push_str(">\n");

    if !linear.duration.is_empty() {
        writeln!(
            xml,
            "            <Duration>{}</Duration>",
            partial_escape(&linear.duration)
        )?;
    }
    write_raw(xml, &linear.extra_elements, 12);

    if !linear.media_files.is_empty() || !linear.media_files_extra.is_empty() {
        xml.push_str("            <MediaFiles>\n");
        for media_file in &linear.media_files {
            write_media_file(xml, media_file)?;
        }
        write_raw(xml, &linear.media_files_extra, 14);
        xml.push_str("            </MediaFiles>\n");
    }

    xml.push_str("          </Linear>\n");
    Ok(())
}

fn write_media_file(xml: &mut String, media_file: &MediaFile) -> Result<()> {
    xml.push_str("              <MediaFile");
    let attrs = [
        ("id", media_file.id.as_deref()),
        ("delivery", media_file.delivery.as_deref()),
        ("type", media_file.mime_type.as_deref()),
        ("codec", media_file.codec.as_deref()),
        ("apiFramework", media_file.api_framework.as_deref()),
    ];
    for (name, value) in attrs {
        if let Some(value) = value {
            write!(xml, " {}=\"{}\"", name, escape(value))?;
        }
    }
    let numeric = [
        ("width", media_file.width),
        ("height", media_file.height),
        ("bitrate", media_file.bitrate),
        ("minBitrate", media_file.min_bitrate),
        ("maxBitrate", media_file.max_bitrate),
    ];
    for (name, value) in numeric {
        if let Some(value) = value {
            write!(xml, " {}=\"{}\"", name, value)?;
        }
    }
    let flags = [
        ("scalable", media_file.scalable),
        ("maintainAspectRatio", media_file.maintain_aspect_ratio),
    ];
    for (name, value) in flags {
        if let Some(value) = value {
            write!(xml, " {}=\"{}\"", name, value)?;
        }
    }
    writeln!(xml, ">{}</MediaFile>", cdata(&media_file.url))?;
    Ok(())
}

fn write_extensions(xml: &mut String, extensions: &[Extension]) -> Result<()> {
    if extensions.is_empty() {
        return Ok(());
    }

    xml.push_str("      <Extensions>\n");
    for extension in extensions {
        xml.push_str("        <Extension");
        if let Some(extension_type) = &extension.r#type {
            write!(xml, " type=\"{}\"", escape(extension_type))?;
        }
        writeln!(xml, ">{}</Extension>", extension.content)?;
    }
    xml.push_str("      </Extensions>\n");
    Ok(())
}

/// Re-emits captured elements verbatim, one per line
fn write_raw(xml: &mut String, elements: &[String], indent: usize) {
    for element in elements {
        xml.push_str(&" ".repeat(indent));
        xml.push_str(element);
        xml.push('\n');
    }
}

/// Wraps a URL in a CDATA section. Values containing the CDATA terminator
/// are escaped as plain text instead.
fn cdata(value: &str) -> String {
    if value.contains("]]>") {
        partial_escape(value).into_owned()
    } else {
        format!("<![CDATA[{}]]>", value)
    }
}

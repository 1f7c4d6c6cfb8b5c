use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::blocks;
use super::links;
use super::{block_text, squash};
use crate::model::ChurchRecord;

static MAILTO: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href^="mailto:"]"#).unwrap());
static TEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(r#"a[href^="tel:"]"#).unwrap());

/// One way of pulling a field out of a listing element. A field is filled
/// by the first strategy in its chain that yields a non-empty value.
#[derive(Debug, Clone, Copy)]
pub enum Strategy {
    /// Text of the first descendant matching the selector.
    Text(&'static str),
    /// Attribute on the listing element itself (`data-city`).
    OwnAttr(&'static str),
    /// Attribute of the first descendant matching the selector.
    Attr(&'static str, &'static str),
    /// Address of the first `mailto:` link.
    Mailto,
    /// Number of the first `tel:` link.
    Tel,
    /// First outbound link that is not social media or the directory itself.
    ExternalLink,
    /// Pattern over the element's plain text.
    Pattern(Pattern),
    /// First non-empty line of the element's plain text.
    FirstLine,
}

#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    Street,
    City,
    State,
    Zip,
    Phone,
    Email,
    Url,
    Clergy,
    Year,
    Diocese,
    Deanery,
    Services,
    Languages,
    ParishSize,
    FeastDay,
}

impl Pattern {
    fn find(self, text: &str) -> Option<String> {
        match self {
            Pattern::Street => blocks::street(text),
            Pattern::City => blocks::city(text),
            Pattern::State => blocks::state(text),
            Pattern::Zip => blocks::zip(text),
            Pattern::Phone => blocks::phone(text),
            Pattern::Email => blocks::email(text),
            Pattern::Url => blocks::url(text),
            Pattern::Clergy => blocks::clergy(text),
            Pattern::Year => blocks::year(text),
            Pattern::Diocese => blocks::diocese(text),
            Pattern::Deanery => blocks::deanery(text),
            Pattern::Services => blocks::services(text),
            Pattern::Languages => blocks::languages(text),
            Pattern::ParishSize => blocks::parish_size(text),
            Pattern::FeastDay => blocks::feast_day(text),
        }
    }
}

/// Everything a strategy may look at for one listing element.
pub struct Ctx<'a> {
    pub el: ElementRef<'a>,
    pub text: String,
    pub page_url: &'a str,
}

impl<'a> Ctx<'a> {
    pub fn new(el: ElementRef<'a>, page_url: &'a str) -> Self {
        Ctx {
            el,
            text: block_text(el),
            page_url,
        }
    }
}

impl Strategy {
    fn apply(&self, ctx: &Ctx) -> Option<String> {
        let raw = match *self {
            Strategy::Text(sel) => {
                let sel = Selector::parse(sel).ok()?;
                ctx.el
                    .select(&sel)
                    .map(|e| e.text().collect::<String>())
                    .find(|t| !t.trim().is_empty())
            }
            Strategy::OwnAttr(attr) => ctx.el.value().attr(attr).map(str::to_string),
            Strategy::Attr(sel, attr) => {
                let sel = Selector::parse(sel).ok()?;
                ctx.el
                    .select(&sel)
                    .find_map(|e| e.value().attr(attr))
                    .map(str::to_string)
            }
            Strategy::Mailto => ctx
                .el
                .select(&MAILTO)
                .filter_map(|a| a.value().attr("href"))
                .map(|h| {
                    let addr = h.trim_start_matches("mailto:");
                    addr.split('?').next().unwrap_or(addr).to_string()
                })
                .find(|a| a.contains('@')),
            Strategy::Tel => ctx
                .el
                .select(&TEL)
                .filter_map(|a| a.value().attr("href"))
                .map(|h| h.trim_start_matches("tel:").to_string())
                .next(),
            Strategy::ExternalLink => links::external_website(ctx.el, ctx.page_url),
            Strategy::Pattern(p) => p.find(&ctx.text),
            Strategy::FirstLine => ctx
                .text
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string),
        }?;
        let value = squash(&raw);
        (!value.is_empty()).then_some(value)
    }
}

pub fn first_match(chain: &[Strategy], ctx: &Ctx) -> Option<String> {
    chain.iter().find_map(|s| s.apply(ctx))
}

/// Strategy chains for every extracted field of one directory's markup.
#[derive(Debug, Clone, Copy)]
pub struct FieldChains {
    pub name: &'static [Strategy],
    pub address: &'static [Strategy],
    pub city: &'static [Strategy],
    pub state: &'static [Strategy],
    pub zip_code: &'static [Strategy],
    pub website: &'static [Strategy],
    pub email: &'static [Strategy],
    pub phone: &'static [Strategy],
    pub clergy: &'static [Strategy],
    pub parish_priest: &'static [Strategy],
    pub dean: &'static [Strategy],
    pub diocese: &'static [Strategy],
    pub deanery: &'static [Strategy],
    pub year: &'static [Strategy],
    pub services: &'static [Strategy],
    pub languages: &'static [Strategy],
    pub feast_day: &'static [Strategy],
    pub parish_size: &'static [Strategy],
}

impl FieldChains {
    /// Class-name conventions shared by most parish directories, then text patterns.
    pub const GENERIC: FieldChains = FieldChains {
        name: &[
            Strategy::Text(".church-name, .parish-name, .name, .title"),
            Strategy::Text("h1, h2, h3, h4"),
            Strategy::Text("strong, b"),
            Strategy::Text("a"),
            Strategy::FirstLine,
        ],
        address: &[
            Strategy::Text(".street-address, .address-line1, .street"),
            Strategy::Pattern(Pattern::Street),
        ],
        city: &[
            Strategy::Text(".locality, .city"),
            Strategy::OwnAttr("data-city"),
            Strategy::Pattern(Pattern::City),
        ],
        state: &[
            Strategy::Text(".region, .state"),
            Strategy::OwnAttr("data-state"),
            Strategy::Pattern(Pattern::State),
        ],
        zip_code: &[
            Strategy::Text(".postal-code, .zip"),
            Strategy::Pattern(Pattern::Zip),
        ],
        website: &[
            Strategy::Attr("a.website, .website a, a.url", "href"),
            Strategy::ExternalLink,
            Strategy::Pattern(Pattern::Url),
        ],
        email: &[
            Strategy::Mailto,
            Strategy::Text(".email"),
            Strategy::Pattern(Pattern::Email),
        ],
        phone: &[
            Strategy::Tel,
            Strategy::Text(".phone, .tel, .telephone"),
            Strategy::Pattern(Pattern::Phone),
        ],
        clergy: &[
            Strategy::Text(".clergy, .priest, .pastor, .rector"),
            Strategy::Pattern(Pattern::Clergy),
        ],
        parish_priest: &[Strategy::Text(".priest, .rector, .pastor")],
        dean: &[Strategy::Text(".dean")],
        diocese: &[
            Strategy::Text(".diocese, .metropolis"),
            Strategy::OwnAttr("data-diocese"),
            Strategy::Pattern(Pattern::Diocese),
        ],
        deanery: &[Strategy::Text(".deanery"), Strategy::Pattern(Pattern::Deanery)],
        year: &[
            Strategy::Text(".founded, .established"),
            Strategy::Pattern(Pattern::Year),
        ],
        services: &[
            Strategy::Text(".services, .schedule, .service-times"),
            Strategy::Pattern(Pattern::Services),
        ],
        languages: &[
            Strategy::Text(".languages, .language"),
            Strategy::Pattern(Pattern::Languages),
        ],
        feast_day: &[Strategy::Text(".feast-day, .feast"), Strategy::Pattern(Pattern::FeastDay)],
        parish_size: &[Strategy::Pattern(Pattern::ParishSize)],
    };

    /// Fill a record from one listing element. `None` when no usable name.
    pub fn extract(&self, el: ElementRef, page_url: &str) -> Option<ChurchRecord> {
        let ctx = Ctx::new(el, page_url);
        let name = first_match(self.name, &ctx).filter(|n| n.len() > 2 && n.len() < 200)?;
        let get = |chain: &[Strategy]| first_match(chain, &ctx);

        let social = links::social_links(el, page_url);
        let website = get(self.website).and_then(|w| crate::fetch::resolve(page_url, &w));
        let patron_saint = blocks::patron_saint(&name);

        Some(ChurchRecord {
            address: get(self.address),
            city: get(self.city),
            state: get(self.state),
            zip_code: get(self.zip_code),
            website,
            contact_email: get(self.email),
            contact_phone: get(self.phone),
            clergy_contact: get(self.clergy),
            parish_priest: get(self.parish_priest),
            dean: get(self.dean),
            diocese: get(self.diocese),
            deanery: get(self.deanery),
            establishment_year: get(self.year).and_then(|y| blocks::year_value(&y)),
            services_schedule: get(self.services),
            languages: get(self.languages),
            feast_day: get(self.feast_day),
            parish_size: get(self.parish_size),
            patron_saint,
            facebook_url: social.facebook,
            instagram_url: social.instagram,
            youtube_url: social.youtube,
            source_url: Some(page_url.to_string()),
            name,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    const PAGE: &str = "https://www.oca.org/parishes";

    fn first_div(html: &Html) -> ElementRef<'_> {
        let sel = Selector::parse("div").unwrap();
        html.select(&sel).next().unwrap()
    }

    #[test]
    fn chain_falls_through_to_patterns() {
        let html = Html::parse_fragment(
            r#"<div data-city="Ignored">
                <h3>St. Innocent Church</h3>
                <p>123 Main Street<br>Springfield, IL 62701</p>
                <p>Phone: (217) 555-0100</p>
                <p>Divine Liturgy: Sunday 9:30 AM</p>
            </div>"#,
        );
        let rec = FieldChains::GENERIC.extract(first_div(&html), PAGE).unwrap();
        assert_eq!(rec.name, "St. Innocent Church");
        assert_eq!(rec.address.as_deref(), Some("123 Main Street"));
        // The data attribute is second in the chain, ahead of the pattern.
        assert_eq!(rec.city.as_deref(), Some("Ignored"));
        assert_eq!(rec.state.as_deref(), Some("IL"));
        assert_eq!(rec.zip_code.as_deref(), Some("62701"));
        assert_eq!(rec.contact_phone.as_deref(), Some("(217) 555-0100"));
        assert_eq!(rec.services_schedule.as_deref(), Some("Divine Liturgy: Sunday 9:30 AM"));
        assert_eq!(rec.patron_saint.as_deref(), Some("Saint Innocent"));
        assert_eq!(rec.source_url.as_deref(), Some(PAGE));
    }

    #[test]
    fn structured_markup_wins() {
        let html = Html::parse_fragment(
            r#"<div>
                <span class="church-name">Holy Trinity Cathedral</span>
                <a href="mailto:office@htc.org?subject=hi">Email</a>
                <a href="tel:7734866064">Call</a>
                <a href="/parishes/holy-trinity">Details</a>
                <a href="http://holytrinitycathedral.net">Website</a>
            </div>"#,
        );
        let rec = FieldChains::GENERIC.extract(first_div(&html), PAGE).unwrap();
        assert_eq!(rec.name, "Holy Trinity Cathedral");
        assert_eq!(rec.contact_email.as_deref(), Some("office@htc.org"));
        assert_eq!(rec.contact_phone.as_deref(), Some("7734866064"));
        assert_eq!(rec.website.as_deref(), Some("http://holytrinitycathedral.net/"));
    }

    #[test]
    fn nameless_element_is_rejected() {
        let html = Html::parse_fragment("<div>  </div>");
        assert!(FieldChains::GENERIC.extract(first_div(&html), PAGE).is_none());
    }
}

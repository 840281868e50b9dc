use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::tables::ExtractorConfig;
use super::{first_attr, first_text, fixed_group, parse_num, path_segment, selector, texts, title_head};
use crate::error::ExtractError;
use crate::model::{CharacterFields, ClassLevel, Gender, JobFields, JobStats, Profile};

type Result<T> = std::result::Result<T, ExtractError>;

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static FREE_COMPANY: LazyLock<Selector> = LazyLock::new(|| selector(r#"dd[class="txt_name"] > a"#));
static SERVER: LazyLock<Selector> = LazyLock::new(|| selector("h2 span"));
static INFO: LazyLock<Selector> = LazyLock::new(|| selector(r#"dd[class="txt_name"]"#));
static PROFILE_TITLE: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div[class="chara_profile_title"]"#));
static LEVEL_CELLS: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static JOB_ICON: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div#class_info > div[class="ic_class_wh24_box"] > img"#));
static RESOURCE: LazyLock<Selector> = LazyLock::new(|| selector("div#param_power_area > ul > li"));
static ATTRIBUTES: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"ul[class="param_list_attributes"] > li > span"#));
static ELEMENTAL: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"ul[class="param_list_elemental"] > li > span[class="val"]"#));
static SECONDARY: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"ul[class="param_list"] > li > span[class="right"]"#));
static ITEM_LINKS: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div[class="item_detail_box"] > div > div > div > div > a"#));

const FEMALE: char = '\u{2640}';
const MALE: char = '\u{2642}';

/// Level table cells come in triples: class name, level, experience.
const LEVEL_STRIDE: usize = 3;
const LEVEL_OFFSET: usize = 1;
const UNLEVELED: &str = "-";

/// A parsed character page. Each accessor reads one field group and fails
/// on its own, so callers can persist groups in sequence.
pub struct CharacterPage<'a> {
    doc: Html,
    config: &'a ExtractorConfig,
}

impl<'a> CharacterPage<'a> {
    pub fn parse(markup: &str, config: &'a ExtractorConfig) -> Self {
        Self {
            doc: Html::parse_document(markup),
            config,
        }
    }

    pub fn fields(&self) -> Result<CharacterFields> {
        Ok(CharacterFields {
            profile: self.profile()?,
            levels: self.levels()?,
            job: self.job()?,
            item_ids: self.item_ids()?,
        })
    }

    pub fn profile(&self) -> Result<Profile> {
        let name = title_head(&self.doc, &TITLE)?;

        let free_company_name = first_text(&self.doc, &FREE_COMPANY, "free company name")?;
        let fc_href = first_attr(&self.doc, &FREE_COMPANY, "href", "free company link")?;
        let free_company_id = path_segment(&fc_href, 3, "free company id")?;

        let server = strip_brackets(&first_text(&self.doc, &SERVER, "server")?)?;

        let (city_state, grand_company_name, grand_company_rank) = match texts(&self.doc, &INFO)
            .as_slice()
        {
            [_, _, city, gc] => {
                let (gc_name, gc_rank) = gc.split_once('/').ok_or(ExtractError::Shape {
                    what: "grand company",
                    expected: 2,
                    found: 1,
                })?;
                if gc_rank.contains('/') {
                    return Err(ExtractError::Shape {
                        what: "grand company",
                        expected: 2,
                        found: gc.split('/').count(),
                    });
                }
                (city.clone(), gc_name.trim().to_string(), gc_rank.trim().to_string())
            }
            other => {
                return Err(ExtractError::Shape {
                    what: "profile info",
                    expected: 4,
                    found: other.len(),
                })
            }
        };

        let title = first_text(&self.doc, &PROFILE_TITLE, "profile title")?;
        let (species, gender) = match title.split('/').collect::<Vec<_>>().as_slice() {
            [species, _clan, gender] => (species.trim().to_string(), parse_gender(gender)?),
            other => {
                return Err(ExtractError::Shape {
                    what: "profile title",
                    expected: 3,
                    found: other.len(),
                })
            }
        };

        Ok(Profile {
            name,
            free_company_name,
            free_company_id,
            server,
            city_state,
            grand_company_name,
            grand_company_rank,
            species,
            gender,
        })
    }

    pub fn levels(&self) -> Result<Vec<ClassLevel>> {
        let cells = texts(&self.doc, &LEVEL_CELLS);
        self.config
            .classes
            .iter()
            .enumerate()
            .map(|(i, class)| {
                let idx = i * LEVEL_STRIDE + LEVEL_OFFSET;
                let cell = cells.get(idx).ok_or(ExtractError::Shape {
                    what: "class levels",
                    expected: self.config.classes.len() * LEVEL_STRIDE,
                    found: cells.len(),
                })?;
                Ok(ClassLevel {
                    class: class.clone(),
                    level: parse_level(cell)?,
                })
            })
            .collect()
    }

    pub fn job(&self) -> Result<JobFields> {
        let src = first_attr(&self.doc, &JOB_ICON, "src", "current job icon")?;
        let param = src
            .split_once('?')
            .map(|(_, q)| q)
            .ok_or(ExtractError::Missing("current job icon parameter"))?;
        let job = self
            .config
            .job_for_image(param)
            .ok_or_else(|| ExtractError::UnknownJobImage(param.to_string()))?
            .to_string();

        // Read every group before building, so a bad group never yields a half-filled record.
        let [hp, mp, tp] = fixed_group::<3>(&texts(&self.doc, &RESOURCE), "resource")?;
        let [strength, dexterity, vitality, intelligence, mind, piety] =
            fixed_group::<6>(&texts(&self.doc, &ATTRIBUTES), "attributes")?;
        let [fire, ice, wind, earth, lightning, water] =
            fixed_group::<6>(&texts(&self.doc, &ELEMENTAL), "elemental")?;
        let [accuracy, crit_rate, determination, defense, parry, magic_defense, attack_power, skill_speed, attack_magic_potency, healing_magic_potency, spell_speed, slow_resist, silence_resist, blind_resist, poison_resist, stun_resist, sleep_resist, bind_resist, heavy_resist, slashing_resist, piercing_resist, blunt_resist] =
            fixed_group::<22>(&texts(&self.doc, &SECONDARY), "secondary")?;

        Ok(JobFields {
            job,
            stats: JobStats {
                hp,
                mp,
                tp,
                strength,
                dexterity,
                vitality,
                intelligence,
                mind,
                piety,
                fire,
                ice,
                wind,
                earth,
                lightning,
                water,
                accuracy,
                crit_rate,
                determination,
                defense,
                parry,
                magic_defense,
                attack_power,
                skill_speed,
                attack_magic_potency,
                healing_magic_potency,
                spell_speed,
                slow_resist,
                silence_resist,
                blind_resist,
                poison_resist,
                stun_resist,
                sleep_resist,
                bind_resist,
                heavy_resist,
                slashing_resist,
                piercing_resist,
                blunt_resist,
            },
        })
    }

    /// External ids of the equipped items, in page order.
    pub fn item_ids(&self) -> Result<Vec<String>> {
        self.doc
            .select(&ITEM_LINKS)
            .map(|a| {
                let href = a
                    .value()
                    .attr("href")
                    .ok_or(ExtractError::Missing("item link"))?;
                path_segment(href, 5, "item id")
            })
            .collect()
    }
}

/// "(Excalibur)" → "Excalibur"
fn strip_brackets(s: &str) -> Result<String> {
    let mut chars = s.chars();
    if chars.next().is_none() || chars.next_back().is_none() {
        return Err(ExtractError::Missing("server"));
    }
    Ok(chars.as_str().to_string())
}

fn parse_gender(raw: &str) -> Result<Gender> {
    let raw = raw.trim();
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(FEMALE), None) => Ok(Gender::Female),
        (Some(MALE), None) => Ok(Gender::Male),
        _ => Err(ExtractError::UnknownGender(raw.to_string())),
    }
}

fn parse_level(cell: &str) -> Result<u32> {
    if cell == UNLEVELED {
        return Ok(0);
    }
    parse_num("class level", cell)
}

//! Cyrillic to Latin name transliteration
//!
//! Produces a canonical lowercase Latin rendering of a name plus the alternate
//! spellings that show up in real mailbox names: colloquial forms of common
//! first names and the competing romanizations of surname endings.

use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

/// Character substitutions applied by [`transcribe`]. Signs map to nothing.
const CYRILLIC_TO_LATIN: &[(char, &str)] = &[
    ('а', "a"),
    ('б', "b"),
    ('в', "v"),
    ('г', "g"),
    ('д', "d"),
    ('е', "e"),
    ('ё', "e"),
    ('ж', "zh"),
    ('з', "z"),
    ('и', "i"),
    ('й', "j"),
    ('к', "k"),
    ('л', "l"),
    ('м', "m"),
    ('н', "n"),
    ('о', "o"),
    ('п', "p"),
    ('р', "r"),
    ('с', "s"),
    ('т', "t"),
    ('у', "u"),
    ('ф', "f"),
    ('х', "h"),
    ('ц', "ts"),
    ('ч', "ch"),
    ('ш', "sh"),
    ('щ', "sch"),
    ('ъ', ""),
    ('ы', "y"),
    ('ь', ""),
    ('э', "e"),
    ('ю', "ju"),
    ('я', "ja"),
];

/// Known Latin spellings and nicknames, keyed by lowercase native first name
const FIRST_NAME_VARIANTS: &[(&str, &[&str])] = &[
    // Male names
    ("александр", &["alexander", "alex", "sasha"]),
    ("алексей", &["alexey", "alexei", "alex"]),
    ("андрей", &["andrey", "andrei", "andrew"]),
    ("антон", &["anton", "tony"]),
    ("артем", &["artem", "artyom", "art"]),
    ("борис", &["boris", "bob"]),
    ("вадим", &["vadim", "vad"]),
    ("валерий", &["valery", "valeri", "val"]),
    ("василий", &["vasily", "vasili", "basil", "vasia"]),
    ("виктор", &["victor", "viktor", "vic"]),
    ("виталий", &["vitaly", "vitaliy", "vital"]),
    ("владимир", &["vladimir", "volodya", "vova", "vlad"]),
    ("владислав", &["vladislav", "vlad"]),
    ("вячеслав", &["vyacheslav", "slava"]),
    ("геннадий", &["gennady", "gena"]),
    ("георгий", &["georgy", "george", "gosha"]),
    ("григорий", &["grigory", "grisha", "greg"]),
    ("даниил", &["daniil", "daniel", "dan"]),
    ("денис", &["denis", "dennis", "den"]),
    ("дмитрий", &["dmitry", "dmitri", "dima"]),
    ("евгений", &["evgeny", "eugene", "zhenya"]),
    ("егор", &["egor", "yegor"]),
    ("иван", &["ivan", "vanya", "john"]),
    ("игорь", &["igor"]),
    ("илья", &["ilya", "ilia", "eli"]),
    ("кирилл", &["kirill", "cyril"]),
    ("константин", &["konstantin", "kostya", "costa"]),
    ("лев", &["lev", "leo"]),
    ("леонид", &["leonid", "leon"]),
    ("максим", &["maksim", "maxim", "max"]),
    ("михаил", &["mikhail", "michael", "misha"]),
    ("никита", &["nikita", "nick"]),
    ("николай", &["nikolay", "nikolai", "nick", "nicolas"]),
    ("олег", &["oleg"]),
    ("павел", &["pavel", "paul", "pasha"]),
    ("петр", &["petr", "peter", "petya"]),
    ("роман", &["roman", "roma"]),
    ("сергей", &["sergey", "sergei", "serge"]),
    ("станислав", &["stanislav", "stas"]),
    ("степан", &["stepan", "stephen", "steve"]),
    ("тимофей", &["timofey", "tim", "timothy"]),
    ("федор", &["fedor", "fyodor", "fred", "theodore"]),
    ("юрий", &["yury", "yuri", "george"]),
    // Female names
    ("александра", &["alexandra", "alex", "sasha"]),
    ("алена", &["alena", "alyona", "elena"]),
    ("алина", &["alina"]),
    ("алиса", &["alisa", "alice"]),
    ("алла", &["alla"]),
    ("анастасия", &["anastasia", "nastya"]),
    ("анна", &["anna", "ann", "anya"]),
    ("валентина", &["valentina", "valya"]),
    ("валерия", &["valeria", "lera"]),
    ("вера", &["vera", "faith"]),
    ("виктория", &["victoria", "vika"]),
    ("галина", &["galina", "galya"]),
    ("дарья", &["daria", "darya", "dasha"]),
    ("евгения", &["evgenia", "zhenya"]),
    ("екатерина", &["ekaterina", "katerina", "katya", "catherine", "kate"]),
    ("елена", &["elena", "helen", "lena"]),
    ("елизавета", &["elizaveta", "liza", "elizabeth"]),
    ("ирина", &["irina", "irene", "ira"]),
    ("карина", &["karina"]),
    ("кристина", &["kristina", "christina"]),
    ("ксения", &["ksenia", "xenia"]),
    ("лариса", &["larisa"]),
    ("любовь", &["lyubov", "luba", "love"]),
    ("людмила", &["lyudmila", "ludmila", "mila"]),
    ("маргарита", &["margarita", "rita", "margaret"]),
    ("марина", &["marina"]),
    ("мария", &["maria", "mary", "masha"]),
    ("надежда", &["nadezhda", "nadya", "hope"]),
    ("наталья", &["natalia", "natalya", "natasha"]),
    ("нина", &["nina"]),
    ("оксана", &["oksana", "oxana"]),
    ("ольга", &["olga", "olya"]),
    ("полина", &["polina"]),
    ("светлана", &["svetlana", "sveta"]),
    ("софия", &["sofia", "sophia", "sonya"]),
    ("татьяна", &["tatiana", "tatyana", "tanya"]),
    ("юлия", &["yulia", "julia", "julie"]),
    ("яна", &["yana", "jana"]),
];

/// Surname endings and their competing Latin spellings.
///
/// Order matters: the first matching ending wins, so the four-letter
/// adjectival endings sit before the two-letter endings they contain.
const SURNAME_ENDINGS: &[(&str, &[&str])] = &[
    ("ский", &["sky", "skiy", "ski", "skij", "skyi"]),
    ("цкий", &["tsky", "tskiy", "tski", "tskij", "tskyi"]),
    ("ская", &["skaya", "skaia"]),
    ("цкая", &["tskaya", "tskaia"]),
    ("ий", &["iy", "y", "i", "ij", "yi"]),
    ("ый", &["y", "yi", "yy"]),
    ("ой", &["oy", "oi"]),
    ("ев", &["ev", "eff"]),
    ("ёв", &["yov", "ev", "iov"]),
    ("ов", &["ov", "off", "ow"]),
    ("ин", &["in", "ine"]),
    ("ын", &["yn", "in"]),
    ("ая", &["aya", "aia"]),
    ("яя", &["yaya", "iaia"]),
    ("ич", &["ich", "itch", "itsch"]),
    ("ыч", &["ych", "ich"]),
    ("ко", &["ko", "cko", "kho"]),
    ("ук", &["uk", "ouk", "uck"]),
    ("юк", &["yuk", "iuk", "juk"]),
    ("ак", &["ak", "ack"]),
    ("ек", &["ek", "eck"]),
    ("ик", &["ik", "ick"]),
];

static LETTER_MAP: LazyLock<HashMap<char, &'static str>> =
    LazyLock::new(|| CYRILLIC_TO_LATIN.iter().copied().collect());

static FIRST_NAME_LEXICON: LazyLock<HashMap<&'static str, &'static [&'static str]>> =
    LazyLock::new(|| FIRST_NAME_VARIANTS.iter().copied().collect());

/// Remove everything that is not a letter, digit, underscore or whitespace, then trim
pub fn clean_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Character that has no Latin rendering in the substitution table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UntranslatableChar(pub char);

/// Apply the substitution table to an already lowercased string
fn transliterate(lowercase: &str) -> Result<String, UntranslatableChar> {
    let mut latin = String::with_capacity(lowercase.len() * 2);
    for c in lowercase.chars() {
        if let Some(replacement) = LETTER_MAP.get(&c) {
            latin.push_str(replacement);
        } else if c.is_ascii() {
            latin.push(c);
        } else {
            return Err(UntranslatableChar(c));
        }
    }
    Ok(latin)
}

/// Canonical lowercase Latin rendering of a name.
///
/// Characters outside ASCII and the Cyrillic table make transliteration fail;
/// the cleaned, lowercased input is returned unchanged in that case.
pub fn transcribe(name: &str) -> String {
    let cleaned = clean_name(name).to_lowercase();
    match transliterate(&cleaned) {
        Ok(latin) => latin,
        Err(UntranslatableChar(c)) => {
            debug!("Cannot transliterate {:?} in name {:?}, keeping original", c, cleaned);
            cleaned
        }
    }
}

/// Lexicon key for a native first name
fn lexicon_key(name: &str) -> String {
    clean_name(name).to_lowercase().replace('ё', "е")
}

/// Latin spellings of a first name, in preference order.
///
/// Falls back to the single canonical transliteration when the name is not
/// in the lexicon.
pub fn first_name_variants(first_name: &str) -> Vec<String> {
    match FIRST_NAME_LEXICON.get(lexicon_key(first_name).as_str()) {
        Some(variants) => variants.iter().map(|v| v.to_string()).collect(),
        None => vec![transcribe(first_name)],
    }
}

/// Latin spellings of a surname: the canonical form first, then one variant
/// per alternate spelling of the first matching ending.
pub fn surname_variants(last_name: &str) -> Vec<String> {
    let canonical = transcribe(last_name);
    let native = clean_name(last_name).to_lowercase();
    let mut variants = vec![canonical.clone()];

    let Some((ending, alternates)) = SURNAME_ENDINGS
        .iter()
        .find(|(ending, _)| native.ends_with(ending))
    else {
        return variants;
    };

    let ending_latin = transliterate(ending).unwrap_or_default();
    let Some(stem) = canonical.strip_suffix(ending_latin.as_str()) else {
        debug!("Surname {:?} did not transliterate cleanly, no ending variants", last_name);
        return variants;
    };

    for alternate in alternates.iter() {
        let variant = format!("{stem}{alternate}");
        if !variants.contains(&variant) {
            variants.push(variant);
        }
    }

    debug!("Surname variants for {:?} via ending {:?}: {:?}", last_name, ending, variants);
    variants
}

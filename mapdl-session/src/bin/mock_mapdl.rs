//! Scripted stand-in for the MAPDL console, used by the integration tests.
//!
//! Implements just enough of the command language to exercise the session:
//! processor prompts, nodes and elements, parameters, `*get`, `/com`
//! substitution, output redirection, `/input`, listings, the JPEG device and
//! the `/clear` confirmation. Anything else is answered with an ERROR block.
//!
//! Console output is buffered the way C stdio buffers it: flushed after every
//! line on a terminal, held in a block buffer otherwise.
//!
//! `--exit-early` prints the banner and exits without ever prompting.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, IsTerminal, Stdout, Write};
use std::path::PathBuf;

const BANNER: &str = " Mechanical APDL (mock) Release 15.0";
const REVISION: f64 = 15.0;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let stdin = io::stdin();
    let mut input = stdin.lock().lines();
    let mut engine = Engine::new(std::env::current_dir()?);

    engine.stdout(BANNER)?;
    engine.stdout("")?;
    if std::env::args().any(|arg| arg == "--exit-early") {
        engine.console.out.flush()?;
        return Ok(());
    }

    while let Some(line) = input.next() {
        let line = line?;
        match engine.run(line.trim(), &mut input)? {
            Flow::Continue => engine.prompt()?,
            Flow::Exit => break,
        }
    }
    engine.console.out.flush()?;
    Ok(())
}

enum Flow {
    Continue,
    Exit,
}

#[derive(Debug, Clone)]
enum Param {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Param::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{}", *value as i64)
            }
            Param::Number(value) => write!(f, "{value}"),
            Param::Text(text) => write!(f, "{text}"),
        }
    }
}

/// Standard output with stdio-style buffering.
struct Console {
    out: BufWriter<Stdout>,
    interactive: bool,
}

impl Console {
    fn new() -> Self {
        let stdout = io::stdout();
        Self {
            interactive: stdout.is_terminal(),
            out: BufWriter::with_capacity(8192, stdout),
        }
    }

    fn line(&mut self, line: &str) -> io::Result<()> {
        write!(self.out, "{line}\r\n")?;
        self.sync()
    }

    /// Write a question that leaves the cursor on its line.
    fn ask(&mut self, question: &str) -> io::Result<()> {
        write!(self.out, "{question}")?;
        self.sync()
    }

    fn sync(&mut self) -> io::Result<()> {
        if self.interactive {
            self.out.flush()?;
        }
        Ok(())
    }
}

struct Engine {
    console: Console,
    dir: PathBuf,
    mode: &'static str,
    nodes: BTreeMap<u64, [f64; 3]>,
    elements: BTreeMap<u64, Vec<u64>>,
    element_types: BTreeMap<u64, String>,
    params: BTreeMap<String, Param>,
    redirect: Option<File>,
    showing: bool,
    plots: u32,
}

impl Engine {
    fn new(dir: PathBuf) -> Self {
        Self {
            console: Console::new(),
            dir,
            mode: "BEGIN",
            nodes: BTreeMap::new(),
            elements: BTreeMap::new(),
            element_types: BTreeMap::new(),
            params: BTreeMap::new(),
            redirect: None,
            showing: false,
            plots: 0,
        }
    }

    fn stdout(&mut self, line: &str) -> io::Result<()> {
        self.console.line(line)
    }

    /// Command output: to the redirect file when one is open.
    fn out(&mut self, line: &str) -> io::Result<()> {
        match self.redirect.as_mut() {
            Some(file) => writeln!(file, "{line}"),
            None => self.console.line(line),
        }
    }

    fn prompt(&mut self) -> io::Result<()> {
        self.stdout("")?;
        self.stdout(&format!(" {}:", self.mode))
    }

    fn error(&mut self, message: &str) -> io::Result<()> {
        self.out(" *** ERROR ***                         CP =       0.000   TIME= 00:00:00")?;
        self.out(&format!(" {message}"))?;
        self.out("")
    }

    fn warning(&mut self, message: &str) -> io::Result<()> {
        self.out(" *** WARNING ***                       CP =       0.000   TIME= 00:00:00")?;
        self.out(&format!(" {message}"))?;
        self.out("")
    }

    fn run<I>(&mut self, line: &str, input: &mut I) -> io::Result<Flow>
    where
        I: Iterator<Item = io::Result<String>>,
    {
        let args: Vec<&str> = line.split(',').map(str::trim).collect();
        let arg = |index: usize| args.get(index).copied().unwrap_or("");
        let name = arg(0).to_ascii_lowercase();

        if let Some((param, value)) = line.split_once('=') {
            if !name.starts_with('/') && !name.starts_with('*') {
                return self.assign(param.trim(), value.trim()).map(|_| Flow::Continue);
            }
        }

        match name.as_str() {
            "" => {}
            "/page" | "/header" | "/format" | "/rgb" | "/nopr" | "/gopr" => {}
            "/prep7" => self.enter("PREP7", " PREP7 (PREPROCESSOR) ENTERED")?,
            "/solu" => self.enter("SOLU_LS1", " SOLUTION ROUTINE ENTERED")?,
            "/post1" => self.enter("POST1", " POST1 (GENERAL POSTPROCESSOR) ENTERED")?,
            "finish" => self.enter("BEGIN", " ROUTINE COMPLETED")?,
            "et" => {
                let id = arg(1).parse().unwrap_or(self.element_types.len() as u64 + 1);
                let kind = arg(2).to_ascii_uppercase();
                self.out(&format!(" ELEMENT TYPE {id} IS {kind}"))?;
                self.element_types.insert(id, kind);
            }
            "n" => {
                let id = arg(1)
                    .parse()
                    .unwrap_or_else(|_| self.nodes.keys().last().map_or(1, |last| last + 1));
                let coordinate = |index: usize| arg(index).parse::<f64>().unwrap_or(0.0);
                let location = [coordinate(2), coordinate(3), coordinate(4)];
                self.nodes.insert(id, location);
                self.out(&format!(
                    " NODE {id}  KCS= 0  X,Y,Z= {} {} {}",
                    location[0], location[1], location[2]
                ))?;
            }
            "e" => {
                let nodes: Vec<u64> = args[1..].iter().filter_map(|n| n.parse().ok()).collect();
                if let Some(missing) = nodes.iter().find(|n| !self.nodes.contains_key(*n)) {
                    self.error(&format!("Node {missing} is not defined."))?;
                } else {
                    let id = self.elements.keys().last().map_or(1, |last| last + 1);
                    self.out(&format!(" ELEMENT {id}  {nodes:?}"))?;
                    self.elements.insert(id, nodes);
                }
            }
            "*del" => {
                self.params.remove(&arg(1).to_ascii_lowercase());
            }
            "*get" => self.get(&args)?,
            "/com" => {
                let text = line.split_once(',').map_or("", |(_, rest)| rest);
                let text = self.substitute(text);
                self.out(&format!(" {text}"))?;
            }
            "/output" => {
                if arg(1).is_empty() {
                    self.redirect = None;
                } else {
                    let file = match arg(2) {
                        "" => arg(1).to_string(),
                        ext => format!("{}.{ext}", arg(1)),
                    };
                    self.redirect = Some(File::create(self.dir.join(file))?);
                }
            }
            "/input" => return self.input(arg(1), arg(2), input),
            "nlist" => self.nlist()?,
            "elist" => self.elist()?,
            "/show" => self.showing = arg(1).eq_ignore_ascii_case("jpeg"),
            "eplot" | "nplot" | "/replot" => self.plot(&name)?,
            "/clear" => {
                self.console.ask(" DO YOU WANT TO CLEAR THE DATABASE (y/n)? ")?;
                let answer = match input.next() {
                    Some(answer) => answer?,
                    None => return Ok(Flow::Exit),
                };
                if answer.trim().eq_ignore_ascii_case("y") {
                    self.nodes.clear();
                    self.elements.clear();
                    self.element_types.clear();
                    self.params.clear();
                    self.mode = "BEGIN";
                    self.out(" CLEAR ANSYS DATABASE AND RESTART")?;
                }
            }
            "/exit" => {
                self.stdout(" ***** ROUTINE COMPLETED *****")?;
                return Ok(Flow::Exit);
            }
            _ => self.error(&format!("Unknown command name {}.", arg(0).to_ascii_uppercase()))?,
        }
        Ok(Flow::Continue)
    }

    fn enter(&mut self, mode: &'static str, banner: &str) -> io::Result<()> {
        self.mode = mode;
        self.out(banner)
    }

    fn assign(&mut self, name: &str, value: &str) -> io::Result<()> {
        let param = match value.parse() {
            Ok(number) => Param::Number(number),
            Err(_) => Param::Text(value.trim_matches('\'').to_string()),
        };
        self.out(&format!(" PARAMETER {} = {}", name.to_ascii_uppercase(), param))?;
        self.params.insert(name.to_ascii_lowercase(), param);
        Ok(())
    }

    fn get(&mut self, args: &[&str]) -> io::Result<()> {
        let arg = |index: usize| args.get(index).copied().unwrap_or("").to_ascii_lowercase();
        let param = arg(1);
        let (entity, number, item, index) = (arg(2), arg(3), arg(4), arg(5));

        let value = match (entity.as_str(), item.as_str()) {
            ("node", "count") => Some(self.nodes.len() as f64),
            ("elem", "count") => Some(self.elements.len() as f64),
            ("active", "rev") => Some(REVISION),
            ("node", "loc") => {
                let axis = match index.as_str() {
                    "x" => 0,
                    "y" => 1,
                    _ => 2,
                };
                let location = number
                    .parse::<u64>()
                    .ok()
                    .and_then(|node| self.nodes.get(&node).copied());
                match location {
                    Some(location) => Some(location[axis]),
                    None => {
                        self.warning(&format!("Node {number} is not defined."))?;
                        return Ok(());
                    }
                }
            }
            _ => None,
        };

        match value {
            Some(value) => {
                let param_value = Param::Number(value);
                self.out(&format!(
                    " *GET  {}  FROM  {}  ITEM={}  VALUE= {}",
                    param.to_ascii_uppercase(),
                    entity.to_ascii_uppercase(),
                    item.to_ascii_uppercase(),
                    param_value
                ))?;
                self.params.insert(param, param_value);
            }
            None => self.error(&format!(
                "*GET of {} {} is not recognized.",
                entity.to_ascii_uppercase(),
                item.to_ascii_uppercase()
            ))?,
        }
        Ok(())
    }

    /// Replace `%name%` with the parameter's value; unknown names are left as written.
    fn substitute(&self, text: &str) -> String {
        let mut result = String::new();
        let mut rest = text;
        while let Some(start) = rest.find('%') {
            let Some(len) = rest[start + 1..].find('%') else {
                break;
            };
            let name = &rest[start + 1..start + 1 + len];
            result.push_str(&rest[..start]);
            match self.params.get(&name.to_ascii_lowercase()) {
                Some(value) => result.push_str(&value.to_string()),
                None => result.push_str(&rest[start..start + len + 2]),
            }
            rest = &rest[start + len + 2..];
        }
        result.push_str(rest);
        result
    }

    fn input<I>(&mut self, name: &str, ext: &str, input: &mut I) -> io::Result<Flow>
    where
        I: Iterator<Item = io::Result<String>>,
    {
        let file = match ext {
            "" => name.to_string(),
            ext => format!("{name}.{ext}"),
        };
        let path = self.dir.join(&file);
        let script = match std::fs::read_to_string(&path) {
            Ok(script) => script,
            Err(_) => {
                self.error(&format!("File {} not found.", path.display()))?;
                return Ok(Flow::Continue);
            }
        };

        self.out(&format!(" USE FILE {file}"))?;
        for line in script.lines() {
            if let Flow::Exit = self.run(line.trim(), input)? {
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    fn nlist(&mut self) -> io::Result<()> {
        self.out(" LIST ALL SELECTED NODES.   DSYS=      0")?;
        self.out("")?;
        self.out("    NODE        X             Y             Z")?;
        let rows: Vec<String> = self
            .nodes
            .iter()
            .map(|(id, [x, y, z])| format!("{id:>9} {x:>13.4} {y:>13.4} {z:>13.4}"))
            .collect();
        for row in rows {
            self.out(&row)?;
        }
        Ok(())
    }

    fn elist(&mut self) -> io::Result<()> {
        self.out(" LIST ALL SELECTED ELEMENTS.  (LIST NODES)")?;
        self.out("")?;
        self.out("    ELEM MAT TYP REL ESY SEC        NODES")?;
        let rows: Vec<String> = self
            .elements
            .iter()
            .map(|(id, nodes)| {
                let nodes: Vec<String> = nodes.iter().map(|n| format!("{n:>6}")).collect();
                format!("{id:>8}   1   1   1   0   1 {}", nodes.join(""))
            })
            .collect();
        for row in rows {
            self.out(&row)?;
        }
        Ok(())
    }

    fn plot(&mut self, command: &str) -> io::Result<()> {
        let kind = if command == "nplot" { "NODE" } else { "ELEMENT" };
        self.out(&format!(" PRODUCING {kind} PLOT"))?;
        if self.showing {
            let file = format!("file{:03}.jpg", self.plots);
            self.plots += 1;
            File::create(self.dir.join(&file))?;
            self.out(&format!(" JPEG WRITTEN TO FILE {file}"))?;
        }
        Ok(())
    }
}
